// Command-line arguments for exampro-shim

use clap::Parser;
use std::path::PathBuf;

/// exampro-shim - cache-first asset shim and sandboxed grader for ExamPro
#[derive(Parser, Debug)]
#[command(name = "exampro-shim", version, about, long_about = None)]
pub struct Args {
    /// Config file to load instead of ~/.exampro/config.toml
    #[arg(long, env = "EXAMPRO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Grade one request (JSON file, or `-` for stdin), print the result and exit
    #[arg(long, value_name = "PATH|-")]
    pub grade: Option<String>,

    /// Start serving without precaching the asset manifest
    #[arg(long)]
    pub skip_install: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["exampro-shim"]).unwrap();
        assert!(args.grade.is_none());
        assert!(!args.skip_install);
    }

    #[test]
    fn test_grade_from_stdin() {
        let args = Args::try_parse_from(["exampro-shim", "--grade", "-", "--skip-install"]).unwrap();
        assert_eq!(args.grade.as_deref(), Some("-"));
        assert!(args.skip_install);
    }
}
