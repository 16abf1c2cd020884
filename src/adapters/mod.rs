//! Infrastructure Adapters
//!
//! Production implementations of the domain ports.
//!
//! ```text
//! EchoProber  ──▶ IcmpProber     (surge-ping)
//! HttpFetcher ──▶ ReqwestFetcher (reqwest)
//! HostFacts   ──▶ SysinfoHost    (sysinfo, resolv.conf)
//! ```

mod host;
mod http;
mod icmp;

pub use host::{parse_resolv_conf, SysinfoHost};
pub use http::ReqwestFetcher;
pub use icmp::IcmpProber;
