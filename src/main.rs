fn main() -> std::process::ExitCode {
    ts_relay_control::run()
}
