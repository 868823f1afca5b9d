//! Bind targets: where a listener attaches.

use std::fmt;
use std::path::PathBuf;

/// Prefixes that mark a Windows named-pipe path.
const PIPE_PREFIXES: [&str; 2] = [r"\\.\pipe\", r"\\?\pipe\"];

/// Exactly one of these is active per listen call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// A TCP host and port. The host may resolve to several interfaces.
    Tcp { host: String, port: u16 },
    /// A Unix domain socket path.
    Unix(PathBuf),
    /// A Windows named pipe. Bound as a Unix socket at the literal path elsewhere.
    Pipe(String),
}

impl BindTarget {
    /// Classify a filesystem-ish path as a socket or a named pipe.
    pub fn from_path(path: &str) -> Self {
        if is_pipe_path(path) {
            BindTarget::Pipe(path.to_string())
        } else {
            BindTarget::Unix(PathBuf::from(path))
        }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            BindTarget::Tcp { host, port } => write!(f, "{}:{}", host, port),
            BindTarget::Unix(path) => write!(f, "{}", path.display()),
            BindTarget::Pipe(name) => f.write_str(name),
        }
    }
}

pub fn is_pipe_path(path: &str) -> bool {
    PIPE_PREFIXES.iter().any(|prefix| {
        path.len() > prefix.len()
            && path
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_paths_are_detected() {
        assert!(is_pipe_path(r"\\.\pipe\testPipe"));
        assert!(is_pipe_path(r"\\?\PIPE\other"));
        assert!(!is_pipe_path(r"\\.\pipe\"));
        assert!(!is_pipe_path("/tmp/server.sock"));
    }

    #[test]
    fn from_path_classifies() {
        assert_eq!(
            BindTarget::from_path(r"\\.\pipe\testPipe"),
            BindTarget::Pipe(r"\\.\pipe\testPipe".into())
        );
        assert_eq!(
            BindTarget::from_path("/tmp/a.sock"),
            BindTarget::Unix("/tmp/a.sock".into())
        );
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        let v6 = BindTarget::Tcp { host: "::1".into(), port: 8080 };
        let v4 = BindTarget::Tcp { host: "localhost".into(), port: 0 };
        assert_eq!(v6.to_string(), "[::1]:8080");
        assert_eq!(v4.to_string(), "localhost:0");
    }
}
