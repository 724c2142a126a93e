use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "codxai",
    version,
    about = "Offline caching proxy for the codxai chat client",
    long_about = "Runs the offline caching and request-routing layer of the codxai chat client\n\
                  as a reverse proxy. Every request is classified and answered network-first,\n\
                  cache-first or stale-while-revalidate from versioned cache namespaces, with\n\
                  an offline page and fallback icon when the upstream cannot be reached."
)]
pub struct CliArgs {
    /// Address the proxy listens on
    #[arg(short, long, default_value = "127.0.0.1:8080", help = "Address to listen on")]
    pub listen: SocketAddr,

    /// Origin the web app is served from
    #[arg(
        short,
        long,
        default_value = "http://localhost:3000/",
        help = "Upstream origin every request is forwarded to"
    )]
    pub upstream: Url,

    #[arg(long, default_value = "codxai", help = "Cache namespace family shared by all versions")]
    pub family: String,

    #[arg(
        long = "cache-version",
        default_value = "v3",
        help = "Version token of the current cache namespaces; changing it purges older ones"
    )]
    pub cache_version: String,

    #[arg(long, default_value = "50", help = "Maximum number of entries in the dynamic namespace")]
    pub max_dynamic_entries: usize,

    #[arg(
        long,
        help = "Persist namespaces under this directory (in memory when omitted)"
    )]
    pub cache_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value = "3600",
        help = "Seconds between maintenance trims of the dynamic namespace (0 disables)"
    )]
    pub maintenance_interval: u64,

    /// Overall HTTP timeout in seconds
    #[arg(long, default_value = "30", help = "Overall timeout for one upstream request in seconds (0 disables)")]
    pub timeout: u64,

    #[arg(long, default_value = "10", help = "Connection timeout in seconds (0 disables)")]
    pub connect_timeout: u64,

    #[arg(long, help = "User agent for requests that carry none")]
    pub user_agent: Option<String>,

    /// Extra headers in "Name: Value" form
    #[arg(short = 'H', long = "header", help = "Header added to every upstream request, e.g. \"Authorization: Bearer x\"")]
    pub headers: Vec<String>,

    #[arg(long, help = "Keep an updated worker waiting until a SKIP_WAITING message arrives")]
    pub no_skip_waiting: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,
}

/// Split a `Name: Value` header argument.
pub fn split_header(header: &str) -> Option<(&str, &str)> {
    let (name, value) = header.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["offline-proxy"]);
        assert_eq!(args.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(args.upstream.as_str(), "http://localhost:3000/");
        assert_eq!(args.cache_version, "v3");
        assert_eq!(args.max_dynamic_entries, 50);
        assert!(args.cache_dir.is_none());
        assert!(!args.no_skip_waiting);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "offline-proxy",
            "--upstream",
            "https://chat.example.com",
            "--cache-version",
            "v4",
            "-H",
            "X-Token: abc",
            "--no-skip-waiting",
        ]);
        assert_eq!(args.upstream.host_str(), Some("chat.example.com"));
        assert_eq!(args.cache_version, "v4");
        assert_eq!(args.headers, vec!["X-Token: abc".to_owned()]);
        assert!(args.no_skip_waiting);
    }

    #[test]
    fn test_split_header() {
        assert_eq!(split_header("X-Token: a:b"), Some(("X-Token", "a:b")));
        assert_eq!(split_header("no-colon"), None);
        assert_eq!(split_header(": value"), None);
    }
}
