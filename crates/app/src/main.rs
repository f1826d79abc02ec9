fn main() {
    if let Err(error) = toplabel_app::run_from_env() {
        toplabel_app::report_fatal(&error);
        std::process::exit(1);
    }
}
