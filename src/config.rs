use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, ValueEnum};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATABASE: &str = "data/bfda.db";
pub const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "http://localhost:5000",
    "http://127.0.0.1:5000",
    "http://localhost:5001",
    "http://127.0.0.1:5001",
];

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Testing,
}

impl Profile {
    /// Default tracing directive when `RUST_LOG` is unset.
    pub fn log_directive(self) -> &'static str {
        match self {
            Profile::Development => "bfda=info,tower_http=info",
            Profile::Production => "bfda=info,tower_http=warn",
            Profile::Testing => "bfda=warn",
        }
    }
}

/// Where calculations are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Database {
    File(PathBuf),
    InMemory,
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "BFDA_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, env = "BFDA_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(long, env = "BFDA_PROFILE", value_enum, default_value_t = Profile::Development)]
    pub profile: Profile,

    /// SQLite file path; ignored by the testing profile.
    #[arg(long, env = "DATABASE_URL")]
    pub database: Option<PathBuf>,

    #[arg(long = "cors-origin", env = "BFDA_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub profile: Profile,
    pub database: Database,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_args(args: ServeArgs) -> Self {
        let database = match args.profile {
            Profile::Testing => Database::InMemory,
            Profile::Development | Profile::Production => Database::File(
                args.database
                    .map(strip_sqlite_scheme)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            ),
        };
        let cors_origins = if args.cors_origins.is_empty() {
            DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect()
        } else {
            args.cors_origins
        };
        Self {
            addr: SocketAddr::new(args.host, args.port),
            profile: args.profile,
            database,
            cors_origins,
        }
    }

    pub fn testing() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            profile: Profile::Testing,
            database: Database::InMemory,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Accepts `sqlite:///path` style URLs as well as bare paths.
fn strip_sqlite_scheme(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|p| p.strip_prefix("sqlite://")) {
        Some(rest) => PathBuf::from(rest),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(profile: Profile) -> ServeArgs {
        ServeArgs {
            port: 5001,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            profile,
            database: None,
            cors_origins: Vec::new(),
        }
    }

    #[test]
    fn development_uses_default_file_and_origins() {
        let config = Config::from_args(args(Profile::Development));
        assert_eq!(config.database, Database::File(PathBuf::from("data/bfda.db")));
        assert_eq!(config.cors_origins.len(), 4);
        assert_eq!(config.addr, SocketAddr::from(([127, 0, 0, 1], 5001)));
    }

    #[test]
    fn testing_profile_is_in_memory() {
        let mut a = args(Profile::Testing);
        a.database = Some(PathBuf::from("ignored.db"));
        assert_eq!(Config::from_args(a).database, Database::InMemory);
    }

    #[test]
    fn database_url_scheme_is_stripped() {
        let mut a = args(Profile::Production);
        a.database = Some(PathBuf::from("sqlite:///var/lib/bfda.db"));
        a.cors_origins = vec!["https://app.example".into()];
        let config = Config::from_args(a);
        assert_eq!(config.database, Database::File(PathBuf::from("/var/lib/bfda.db")));
        assert_eq!(config.cors_origins, vec!["https://app.example"]);
    }
}
