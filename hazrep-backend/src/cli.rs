/// Parsed command-line arguments.
pub struct CliArgs {
    /// Path to configuration file, if provided via `--config-path` or `-c`.
    pub config_path: Option<String>,
    /// Whether help was requested.
    pub help_requested: bool,
}

impl CliArgs {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            config_path: Self::extract_config_path(&args),
            help_requested: args.iter().any(|a| a == "--help" || a == "-h"),
        }
    }

    /// Print usage information to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage: hazrep-backend [--config-path PATH] [--help]\n\n\
             --config-path, -c    Path to configuration file (overrides HAZREP_CONFIG_PATH env var)"
        );
    }

    fn extract_config_path(args: &[String]) -> Option<String> {
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            if let Some(stripped) = arg.strip_prefix("--config-path=") {
                return Some(stripped.to_string());
            }
            if arg == "--config-path" || arg == "-c" {
                return iter.next().cloned();
            }
        }
        None
    }
}
