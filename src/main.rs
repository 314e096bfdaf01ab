fn main() {
    if let Err(err) = tenantscan::cli::run() {
        tenantscan::ui::eprintln_error(&err);
        std::process::exit(tenantscan::exit::exit_code(&err));
    }
}
