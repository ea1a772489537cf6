mod rapl;

pub use rapl::{probe_domains, DomainProbe, RaplCounter};
