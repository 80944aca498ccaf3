fn main() -> std::process::ExitCode {
    cardstore_cli::run()
}
