fn main() {
    if let Err(err) = bhpoll::cli::run() {
        bhpoll::ui::eprintln_error(&err);
        std::process::exit(bhpoll::exit::exit_code(&err));
    }
}
