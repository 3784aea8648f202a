use serde_json::{Map, Value};
use thiserror::Error;

pub type Props = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalRole {
    Generic,
    From,
    To,
}

impl PrincipalRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            PrincipalRole::Generic => "Principal",
            PrincipalRole::From => "FromPrincipal",
            PrincipalRole::To => "ToPrincipal",
        }
    }

    const fn kind_key(self) -> &'static str {
        match self {
            PrincipalRole::Generic => "PrincipalKind",
            PrincipalRole::From => "FromPrincipalKind",
            PrincipalRole::To => "ToPrincipalKind",
        }
    }

    const fn props_key(self) -> &'static str {
        match self {
            PrincipalRole::Generic => "Props",
            PrincipalRole::From => "FromPrincipalProps",
            PrincipalRole::To => "ToPrincipalProps",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub object_id: String,
    pub kind: String,
    pub props: Props,
}

impl Principal {
    fn extract(obj: &Map<String, Value>, role: PrincipalRole) -> Option<Self> {
        let object_id = obj.get(role.as_str()).filter(|v| !v.is_null())?;
        let kind = obj
            .get(role.kind_key())
            .map(scalar_to_string)
            .unwrap_or_else(|| "Unknown".to_string());
        let props = obj
            .get(role.props_key())
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self {
            object_id: scalar_to_string(object_id),
            kind,
            props,
        })
    }

    pub fn name(&self) -> &str {
        self.props
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.object_id)
    }

    pub fn description(&self) -> Option<&str> {
        self.props.get("description").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationship {
    pub from: Option<Principal>,
    pub to: Option<Principal>,
}

impl Relationship {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Which principal keys a finding record carries.
#[derive(Debug, Clone, PartialEq)]
pub enum FindingShape {
    Plain,
    GenericPrincipal {
        principal: Principal,
        relationship: Relationship,
    },
    FromToPrincipal(Relationship),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub id: String,
    pub finding_type: String,
    pub impact_percentage: Option<f64>,
    pub exposure_percentage: Option<f64>,
    pub shape: FindingShape,
    pub raw: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum FindingParseError {
    #[error("所見レコードが JSON オブジェクトではありません")]
    NotAnObject,
    #[error("所見レコードに `{0}` がありません")]
    MissingField(&'static str),
}

impl Finding {
    /// Parses one record of a details page. `requested_type` is used when the
    /// record itself does not name its finding type.
    pub fn parse(value: Value, requested_type: &str) -> Result<Self, FindingParseError> {
        let Value::Object(raw) = value else {
            return Err(FindingParseError::NotAnObject);
        };

        let id = raw
            .get("id")
            .filter(|v| !v.is_null())
            .map(scalar_to_string)
            .ok_or(FindingParseError::MissingField("id"))?;
        let finding_type = raw
            .get("Finding")
            .and_then(Value::as_str)
            .unwrap_or(requested_type)
            .to_string();

        let relationship = Relationship {
            from: Principal::extract(&raw, PrincipalRole::From),
            to: Principal::extract(&raw, PrincipalRole::To),
        };
        let shape = match Principal::extract(&raw, PrincipalRole::Generic) {
            Some(principal) => FindingShape::GenericPrincipal {
                principal,
                relationship,
            },
            None if !relationship.is_empty() => FindingShape::FromToPrincipal(relationship),
            None => FindingShape::Plain,
        };

        Ok(Self {
            id,
            finding_type,
            impact_percentage: raw.get("ImpactPercentage").and_then(Value::as_f64),
            exposure_percentage: raw.get("ExposurePercentage").and_then(Value::as_f64),
            shape,
            raw,
        })
    }

    /// True when the record carries a `Principal` key, even a null one.
    pub fn names_generic_principal(&self) -> bool {
        self.raw.contains_key(PrincipalRole::Generic.as_str())
    }

    /// Principals in artifact order: generic, from, to.
    pub fn principals(&self) -> Vec<(PrincipalRole, &Principal)> {
        let mut out = Vec::with_capacity(3);
        let relationship = match &self.shape {
            FindingShape::Plain => return out,
            FindingShape::GenericPrincipal {
                principal,
                relationship,
            } => {
                out.push((PrincipalRole::Generic, principal));
                relationship
            }
            FindingShape::FromToPrincipal(relationship) => relationship,
        };
        if let Some(from) = &relationship.from {
            out.push((PrincipalRole::From, from));
        }
        if let Some(to) = &relationship.to {
            out.push((PrincipalRole::To, to));
        }
        out
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_classifies_generic_principal_records() {
        let f = Finding::parse(
            json!({
                "id": 17,
                "Finding": "LargeDefaultGroupsUsers",
                "Principal": "S-1-5-21-1",
                "PrincipalKind": "Group",
                "Props": {"name": "DOMAIN USERS@CORP.LOCAL"},
                "ImpactPercentage": 0.5
            }),
            "ignored",
        )
        .expect("parse");

        assert_eq!(f.id, "17");
        assert_eq!(f.finding_type, "LargeDefaultGroupsUsers");
        assert!(f.names_generic_principal());
        let principals = f.principals();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].0, PrincipalRole::Generic);
        assert_eq!(principals[0].1.name(), "DOMAIN USERS@CORP.LOCAL");
    }

    #[test]
    fn parse_classifies_relationship_records() {
        let f = Finding::parse(
            json!({
                "id": "abc",
                "FromPrincipal": "S-1-5-21-2",
                "FromPrincipalKind": "User",
                "FromPrincipalProps": {"name": "ALICE@CORP.LOCAL"},
                "ToPrincipal": "S-1-5-21-512",
                "ToPrincipalKind": "Group",
                "ToPrincipalProps": {"name": "DOMAIN ADMINS@CORP.LOCAL"},
                "ExposurePercentage": 0.9
            }),
            "T0GenericAll",
        )
        .expect("parse");

        assert_eq!(f.finding_type, "T0GenericAll");
        assert!(matches!(f.shape, FindingShape::FromToPrincipal(_)));
        let roles: Vec<_> = f.principals().into_iter().map(|(r, _)| r).collect();
        assert_eq!(roles, vec![PrincipalRole::From, PrincipalRole::To]);
    }

    #[test]
    fn parse_keeps_relationship_next_to_generic_principal() {
        let f = Finding::parse(
            json!({
                "id": "x",
                "Principal": "p",
                "FromPrincipal": "f",
                "ToPrincipal": "t"
            }),
            "T",
        )
        .expect("parse");
        let roles: Vec<_> = f.principals().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            roles,
            vec![PrincipalRole::Generic, PrincipalRole::From, PrincipalRole::To]
        );
        assert_eq!(f.principals()[0].1.kind, "Unknown");
        assert_eq!(f.principals()[0].1.name(), "p");
    }

    #[test]
    fn null_principal_is_named_but_yields_no_artifact() {
        let f = Finding::parse(json!({"id": "x", "Principal": null}), "T").expect("parse");
        assert!(f.names_generic_principal());
        assert_eq!(f.shape, FindingShape::Plain);
        assert!(f.principals().is_empty());
    }

    #[test]
    fn parse_without_principals_is_plain() {
        let f = Finding::parse(json!({"id": "x", "ExposurePercentage": 0.1}), "T").expect("parse");
        assert_eq!(f.shape, FindingShape::Plain);
        assert!(f.principals().is_empty());
    }

    #[test]
    fn parse_rejects_records_without_id() {
        let err = Finding::parse(json!({"Finding": "T"}), "T").unwrap_err();
        assert!(matches!(err, FindingParseError::MissingField("id")));
        let err = Finding::parse(json!([1, 2]), "T").unwrap_err();
        assert!(matches!(err, FindingParseError::NotAnObject));
    }
}
