//! Bitcoin-style command line (`-name[=value]`) and `key=value` config file.

use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONF: &str = "chainharness.conf";
const DEFAULT_STAKE_INTERVAL_MS: u64 = 250;

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArgs {
    pub data_dir: PathBuf,
    /// Config file name, relative to the data directory unless absolute.
    pub conf: String,
    pub regtest: bool,
    pub txindex: bool,
    pub timestampindex: bool,
    pub smsg_scan_incoming: bool,
    pub debug: bool,
    pub stake_interval: Duration,
    /// Flags the devnode accepts but ignores.
    pub ignored: Vec<String>,
}

fn flag_value(name: &str, value: Option<&str>) -> Result<bool> {
    match value {
        None | Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(other) => Err(Error::InvalidArgument(format!("-{name}={other}"))),
    }
}

impl NodeArgs {
    /// Parses arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut data_dir = None;
        let mut parsed = NodeArgs {
            data_dir: PathBuf::new(),
            conf: DEFAULT_CONF.to_string(),
            regtest: false,
            txindex: false,
            timestampindex: false,
            smsg_scan_incoming: false,
            debug: false,
            stake_interval: Duration::from_millis(DEFAULT_STAKE_INTERVAL_MS),
            ignored: Vec::new(),
        };

        for arg in args {
            let arg = arg.as_ref();
            let Some(body) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
                return Err(Error::InvalidArgument(arg.to_string()));
            };
            let (name, value) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };

            match name {
                "datadir" => {
                    let value = value.ok_or_else(|| Error::InvalidArgument(arg.to_string()))?;
                    data_dir = Some(PathBuf::from(value));
                }
                "conf" => {
                    parsed.conf = value
                        .ok_or_else(|| Error::InvalidArgument(arg.to_string()))?
                        .to_string();
                }
                "staketime" => {
                    let ms = value
                        .and_then(|v| v.parse::<u64>().ok())
                        .filter(|ms| *ms > 0)
                        .ok_or_else(|| Error::InvalidArgument(arg.to_string()))?;
                    parsed.stake_interval = Duration::from_millis(ms);
                }
                "regtest" => parsed.regtest = flag_value(name, value)?,
                "txindex" => parsed.txindex = flag_value(name, value)?,
                "timestampindex" => parsed.timestampindex = flag_value(name, value)?,
                "smsgscanincoming" => parsed.smsg_scan_incoming = flag_value(name, value)?,
                "debug" => parsed.debug = true,
                _ => parsed.ignored.push(arg.to_string()),
            }
        }

        parsed.data_dir = data_dir.ok_or(Error::MissingDataDir)?;
        Ok(parsed)
    }

    pub fn conf_path(&self) -> PathBuf {
        let conf = Path::new(&self.conf);
        if conf.is_absolute() {
            conf.to_path_buf()
        } else {
            self.data_dir.join(conf)
        }
    }
}

/// Settings read from the node config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConf {
    pub regtest: bool,
    pub port: u16,
    pub rpcport: u16,
    pub rpcuser: String,
    pub rpcpassword: String,
    pub bind: IpAddr,
}

impl NodeConf {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadConf {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut regtest = false;
        let mut port = None;
        let mut rpcport = None;
        let mut rpcuser = None;
        let mut rpcpassword = None;

        let invalid = |line: usize, reason: String| Error::InvalidConf {
            path: path.to_path_buf(),
            line,
            reason,
        };

        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(i + 1, format!("expected key=value, got {line:?}")))?;
            let (key, value) = (key.trim(), value.trim());
            let parse_port = |v: &str| {
                v.parse::<u16>()
                    .map_err(|e| invalid(i + 1, format!("{key}: {e}")))
            };

            match key {
                "regtest" => regtest = value == "1",
                "port" => port = Some(parse_port(value)?),
                "rpcport" => rpcport = Some(parse_port(value)?),
                "rpcuser" => rpcuser = Some(value.to_string()),
                "rpcpassword" => rpcpassword = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            regtest,
            port: port.ok_or(Error::MissingSetting("port"))?,
            rpcport: rpcport.ok_or(Error::MissingSetting("rpcport"))?,
            rpcuser: rpcuser.ok_or(Error::MissingSetting("rpcuser"))?,
            rpcpassword: rpcpassword.ok_or(Error::MissingSetting("rpcpassword"))?,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = NodeArgs::parse([
            "-datadir=/tmp/node0",
            "-conf=node.conf",
            "-regtest",
            "-txindex",
            "-debug",
            "-staketime=50",
            "-printtoconsole",
        ])
        .unwrap();

        assert_eq!(args.data_dir, PathBuf::from("/tmp/node0"));
        assert_eq!(args.conf_path(), PathBuf::from("/tmp/node0/node.conf"));
        assert!(args.regtest && args.txindex && args.debug);
        assert!(!args.timestampindex);
        assert_eq!(args.stake_interval, Duration::from_millis(50));
        assert_eq!(args.ignored, vec!["-printtoconsole"]);
    }

    #[test]
    fn test_parse_requires_datadir() {
        assert!(matches!(
            NodeArgs::parse(["-regtest"]),
            Err(Error::MissingDataDir)
        ));
        assert!(matches!(
            NodeArgs::parse(["-datadir=/x", "-txindex=yes"]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            NodeArgs::parse(["-datadir=/x", "plain"]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_conf() {
        let text = "regtest=1\nserver=1\nport=11000\nrpcport=12000\n# comment\nrpcuser=u\nrpcpassword=p\nlisten=1\n";
        let conf = NodeConf::parse(Path::new("node.conf"), text).unwrap();
        assert!(conf.regtest);
        assert_eq!(conf.port, 11000);
        assert_eq!(conf.rpcport, 12000);
        assert_eq!(conf.rpcuser, "u");
    }

    #[test]
    fn test_conf_errors() {
        let missing = NodeConf::parse(Path::new("c"), "port=1\nrpcport=2\nrpcuser=u\n");
        assert!(matches!(missing, Err(Error::MissingSetting("rpcpassword"))));

        let bad_port = NodeConf::parse(Path::new("c"), "port=99999\n");
        assert!(matches!(bad_port, Err(Error::InvalidConf { line: 1, .. })));

        let no_equals = NodeConf::parse(Path::new("c"), "\nport\n");
        assert!(matches!(no_equals, Err(Error::InvalidConf { line: 2, .. })));
    }
}
