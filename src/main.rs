fn main() {
    #[cfg(feature = "cli")]
    ipspatch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("ipspatch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
