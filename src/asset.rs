use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::api::{ApiError, BloodHoundClient, Transport};

const DIRECTORY_TYPES: &[&str] = &[
    "User",
    "Computer",
    "Group",
    "Container",
    "Domain",
    "GPO",
    "Aiaca",
    "Rootca",
    "Enterpriseca",
    "Ntauthstore",
    "Certtemplate",
    "OU",
];

const AZURE_TYPES: &[&str] = &[
    "AZApp",
    "AZGroup",
    "AZUser",
    "AZRole",
    "AZTenant",
    "AZServicePrincipal",
];

const AZ_TENANT_RELATED_TYPES: &[&str] = &[
    "descendent-users",
    "descendent-groups",
    "descendent-management-groups",
    "descendent-subscriptions",
    "descendent-resource-groups",
    "descendent-virtual-machines",
    "descendent-managed-clusters",
    "descendent-vm-scale-sets",
    "descendent-container-registries",
    "descendent-web-apps",
    "descendent-automation-accounts",
    "descendent-key-vaults",
    "descendent-function-apps",
    "descendent-logic-apps",
    "descendent-applications",
    "descendent-service-principals",
    "descendent-devices",
    "inbound-control",
];

const RELATED_PAGE_LIMIT: usize = 128;

/// Related entity types queried for an Azure object, mapped to the key their count lands under.
fn azure_related_types(obj_type: &str) -> &'static [(&'static str, &'static str)] {
    match obj_type {
        "AZApp" => &[("inbound-control", "inbound_object_control")],
        "AZGroup" => &[
            ("group-membership", "group_membership"),
            ("group-members", "group_members"),
            ("roles", "roles"),
            ("inbound-control", "inbound_object_control"),
            ("outbound-control", "outbound_object_control"),
        ],
        "AZRole" => &[("active-assignments", "active_assignments")],
        "AZServicePrincipal" => &[
            ("roles", "roles"),
            ("inbound-control", "inbound_object_control"),
            ("outbound-control", "outbound_object_control"),
            (
                "inbound-abusable-app-role-assignments",
                "inbound_abusable_app_role_assignments",
            ),
            (
                "outbound-abusable-app-role-assignments",
                "outbound_abusable_app_role_assignments",
            ),
        ],
        "AZUser" => &[
            ("group-membership", "group_membership"),
            ("roles", "roles"),
            ("outbound-execution-privileges", "execution_privileges"),
            ("outbound-control", "outbound_object_control"),
            ("inbound-control", "inbound_object_control"),
        ],
        _ => &[],
    }
}

pub fn azure_type_path(obj_type: &str) -> String {
    match obj_type {
        "AZServicePrincipal" => "service-principals".to_string(),
        "AZApp" => "applications".to_string(),
        other => format!("{}s", other.strip_prefix("AZ").unwrap_or(other)).to_ascii_lowercase(),
    }
}

pub fn primary_path(object_id: &str, obj_type: &str) -> String {
    if DIRECTORY_TYPES.contains(&obj_type) {
        format!("/api/v2/{}s/{object_id}", obj_type.to_ascii_lowercase())
    } else if AZURE_TYPES.contains(&obj_type) {
        format!(
            "/api/v2/azure/{}?object_id={object_id}&counts=false",
            azure_type_path(obj_type)
        )
    } else {
        format!("/api/v2/base/{object_id}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetInformation {
    pub object_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Returns `None` when the search has no hit for the object id.
pub fn fetch_asset_information<T: Transport>(
    client: &BloodHoundClient<T>,
    object_id: &str,
) -> Result<Option<AssetInformation>, ApiError> {
    let hits = client.search(object_id)?;
    let Some(first) = hits.first() else {
        return Ok(None);
    };
    let kind = first.kind.clone();
    debug!(object_id, kind = %kind, "resolved object type");

    let mut response: Value = client.get_json(&primary_path(object_id, &kind))?;
    let mut notes = Vec::new();

    if kind.starts_with("AZ") {
        if kind == "AZTenant" {
            enrich_tenant(client, object_id, &mut response, &mut notes);
        } else {
            enrich_azure(client, object_id, &kind, &mut response, &mut notes);
        }
    }

    Ok(Some(AssetInformation {
        object_id: object_id.to_string(),
        kind,
        response,
        notes,
    }))
}

fn related_count<T: Transport>(
    client: &BloodHoundClient<T>,
    path: &str,
    related_type: &str,
    notes: &mut Vec<String>,
) -> Option<u64> {
    match client.get_json::<Value>(path) {
        Ok(v) => match v.get("count").and_then(Value::as_u64) {
            Some(count) => Some(count),
            None => {
                notes.push(format!("Failed to fetch data for related type: {related_type}"));
                None
            }
        },
        Err(err) => {
            warn!(related_type, error = %err, "related entity lookup failed");
            notes.push(format!("Failed to fetch data for related type: {related_type}"));
            None
        }
    }
}

fn data_object(response: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    if !response.get("data").is_some_and(Value::is_object) {
        response.as_object_mut()?.insert("data".to_string(), json!({}));
    }
    response.get_mut("data")?.as_object_mut()
}

fn enrich_tenant<T: Transport>(
    client: &BloodHoundClient<T>,
    object_id: &str,
    response: &mut Value,
    notes: &mut Vec<String>,
) {
    let mut descendent_count = 0;
    let mut inbound_control_count = 0;
    for rel in AZ_TENANT_RELATED_TYPES {
        let path = format!(
            "/api/v2/azure/tenants?object_id={object_id}&related_entity_type={rel}&skip=0&limit={RELATED_PAGE_LIMIT}"
        );
        let Some(count) = related_count(client, &path, rel, notes) else {
            continue;
        };
        if *rel == "inbound-control" {
            inbound_control_count = count;
        } else {
            descendent_count += count;
        }
    }
    if let Some(data) = data_object(response) {
        data.insert(
            "inbound_object_control".to_string(),
            json!(inbound_control_count),
        );
        data.insert(
            "descendents".to_string(),
            json!({"descendent_counts": descendent_count}),
        );
    }
}

fn enrich_azure<T: Transport>(
    client: &BloodHoundClient<T>,
    object_id: &str,
    obj_type: &str,
    response: &mut Value,
    notes: &mut Vec<String>,
) {
    let type_path = azure_type_path(obj_type);
    for (related_type, key) in azure_related_types(obj_type) {
        let path = format!(
            "/api/v2/azure/{type_path}?object_id={object_id}&related_entity_type={related_type}&skip=0&limit={RELATED_PAGE_LIMIT}"
        );
        let Some(count) = related_count(client, &path, related_type, notes) else {
            continue;
        };
        if let Some(data) = data_object(response) {
            data.insert((*key).to_string(), json!(count));
        }
    }
}

/// Any failure of the shortest-path query reads as "no path".
pub fn does_path_exist<T: Transport>(
    client: &BloodHoundClient<T>,
    start_node: &str,
    end_node: &str,
) -> bool {
    match client.shortest_path(start_node, end_node) {
        Ok(_) => true,
        Err(err) => {
            debug!(start_node, end_node, error = %err, "no shortest path");
            false
        }
    }
}

pub fn get_object_id<T: Transport>(
    client: &BloodHoundClient<T>,
    name: &str,
) -> Result<Option<String>, ApiError> {
    let hits = client.search(&name.replace(' ', "%20"))?;
    Ok(hits
        .into_iter()
        .find(|hit| hit.name.trim() == name)
        .map(|hit| hit.objectid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use std::cell::RefCell;

    /// Answers by the first matching URI prefix; unmatched URIs return 404.
    struct Routes {
        routes: Vec<(&'static str, u16, String)>,
        seen: RefCell<Vec<String>>,
    }

    impl Routes {
        fn new(routes: Vec<(&'static str, u16, Value)>) -> Self {
            Self {
                routes: routes
                    .into_iter()
                    .map(|(p, s, v)| (p, s, v.to_string()))
                    .collect(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Routes {
        fn get(&self, uri: &str) -> Result<ApiResponse, ApiError> {
            self.seen.borrow_mut().push(uri.to_string());
            Ok(self
                .routes
                .iter()
                .find(|(prefix, _, _)| uri.starts_with(prefix))
                .map(|(_, status, body)| ApiResponse::new(*status, body.clone()))
                .unwrap_or_else(|| ApiResponse::new(404, "{}")))
        }
    }

    #[test]
    fn primary_paths_follow_object_type() {
        assert_eq!(primary_path("S-1", "User"), "/api/v2/users/S-1");
        assert_eq!(primary_path("x", "OU"), "/api/v2/ous/x");
        assert_eq!(
            primary_path("x", "AZServicePrincipal"),
            "/api/v2/azure/service-principals?object_id=x&counts=false"
        );
        assert_eq!(
            primary_path("x", "AZApp"),
            "/api/v2/azure/applications?object_id=x&counts=false"
        );
        assert_eq!(
            primary_path("x", "AZTenant"),
            "/api/v2/azure/tenants?object_id=x&counts=false"
        );
        assert_eq!(primary_path("x", "Meta"), "/api/v2/base/x");
    }

    #[test]
    fn unknown_object_returns_none() {
        let client = BloodHoundClient::new(Routes::new(vec![(
            "/api/v2/search",
            200,
            json!({"data": []}),
        )]));
        assert!(fetch_asset_information(&client, "nope").expect("lookup").is_none());
    }

    #[test]
    fn directory_objects_fetch_the_primary_record() {
        let client = BloodHoundClient::new(Routes::new(vec![
            ("/api/v2/search", 200, json!({"data": [{"objectid": "S-1", "name": "ALICE", "type": "User"}]})),
            ("/api/v2/users/S-1", 200, json!({"data": {"props": {"name": "ALICE"}}})),
        ]));
        let info = fetch_asset_information(&client, "S-1")
            .expect("lookup")
            .expect("found");
        assert_eq!(info.kind, "User");
        assert_eq!(info.response["data"]["props"]["name"], "ALICE");
        assert!(info.notes.is_empty());
    }

    #[test]
    fn tenant_sums_descendent_counts_and_notes_failures() {
        let client = BloodHoundClient::new(Routes::new(vec![
            ("/api/v2/search", 200, json!({"data": [{"objectid": "t1", "name": "T", "type": "AZTenant"}]})),
            ("/api/v2/azure/tenants?object_id=t1&counts=false", 200, json!({"data": {"name": "T"}})),
            ("/api/v2/azure/tenants?object_id=t1&related_entity_type=descendent-users&", 200, json!({"count": 3})),
            ("/api/v2/azure/tenants?object_id=t1&related_entity_type=descendent-groups&", 200, json!({"count": 4})),
            ("/api/v2/azure/tenants?object_id=t1&related_entity_type=inbound-control&", 200, json!({"count": 2})),
        ]));
        let info = fetch_asset_information(&client, "t1")
            .expect("lookup")
            .expect("found");
        assert_eq!(info.response["data"]["descendents"]["descendent_counts"], 7);
        assert_eq!(info.response["data"]["inbound_object_control"], 2);
        assert_eq!(info.notes.len(), AZ_TENANT_RELATED_TYPES.len() - 3);
    }

    #[test]
    fn azure_objects_map_related_counts_to_keys() {
        let client = BloodHoundClient::new(Routes::new(vec![
            ("/api/v2/search", 200, json!({"data": [{"objectid": "r1", "name": "R", "type": "AZRole"}]})),
            ("/api/v2/azure/roles?object_id=r1&counts=false", 200, json!({"data": {"name": "R"}})),
            ("/api/v2/azure/roles?object_id=r1&related_entity_type=active-assignments", 200, json!({"count": 5})),
        ]));
        let info = fetch_asset_information(&client, "r1")
            .expect("lookup")
            .expect("found");
        assert_eq!(info.response["data"]["active_assignments"], 5);
        assert_eq!(info.response["data"]["name"], "R");
    }

    #[test]
    fn path_existence_follows_the_status() {
        let ok = BloodHoundClient::new(Routes::new(vec![(
            "/api/v2/graphs/shortest-path",
            200,
            json!({"data": {"nodes": {}}}),
        )]));
        assert!(does_path_exist(&ok, "a", "b"));

        let missing = BloodHoundClient::new(Routes::new(vec![]));
        assert!(!does_path_exist(&missing, "a", "b"));
        assert_eq!(
            missing.transport().seen.borrow().as_slice(),
            ["/api/v2/graphs/shortest-path?start_node=a&end_node=b"]
        );
    }

    #[test]
    fn object_id_requires_an_exact_name_match() {
        let client = BloodHoundClient::new(Routes::new(vec![(
            "/api/v2/search",
            200,
            json!({"data": [
                {"objectid": "S-2", "name": "DOMAIN ADMINS@CORP.LOCAL (old)", "type": "Group"},
                {"objectid": "S-1", "name": " DOMAIN ADMINS@CORP.LOCAL ", "type": "Group"}
            ]}),
        )]));
        assert_eq!(
            get_object_id(&client, "DOMAIN ADMINS@CORP.LOCAL").expect("lookup"),
            Some("S-1".to_string())
        );
        assert_eq!(
            client.transport().seen.borrow().as_slice(),
            ["/api/v2/search?q=DOMAIN%20ADMINS@CORP.LOCAL"]
        );
        assert_eq!(get_object_id(&client, "nobody").expect("lookup"), None);
    }
}
