use thiserror::Error;

/// A CBHE/IPN endpoint identifier, textual form `ipn:<node>.<service>`.
///
/// BPv6 with compressed bundle header encoding carries endpoints as two
/// small integers; no dictionary-based EIDs are supported.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Eid {
    pub node: u32,
    pub service: u32,
}

#[derive(Error, Debug)]
pub enum EidError {
    #[error("expecting 'ipn' scheme")]
    UnsupportedScheme,

    #[error("expecting 'ipn:<node>.<service>'")]
    MissingSeparator,

    #[error("invalid ipn node or service number")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

impl Eid {
    /// The null endpoint, `ipn:0.0`.
    pub const NULL: Eid = Eid {
        node: 0,
        service: 0,
    };

    pub const fn new(node: u32, service: u32) -> Self {
        Self { node, service }
    }

    pub fn is_null(&self) -> bool {
        self.node == 0 && self.service == 0
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ssp = s.strip_prefix("ipn:").ok_or(EidError::UnsupportedScheme)?;
        let (node, service) = ssp.split_once('.').ok_or(EidError::MissingSeparator)?;
        Ok(Self {
            node: node.parse()?,
            service: service.parse()?,
        })
    }
}

/// Channel addressing: the three endpoints a bundle engine needs to know.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct Route {
    pub local: Eid,
    pub destination: Eid,
    pub report_to: Eid,
}

impl Route {
    pub const fn new(local: Eid, destination: Eid) -> Self {
        Self {
            local,
            destination,
            report_to: Eid::NULL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipn_check(s: &str, node: u32, service: u32) {
        let eid: Eid = s.parse().expect("failed to parse");
        assert_eq!(eid, Eid::new(node, service));
        assert_eq!(eid.to_string(), s);
    }

    fn expect_error(s: &str) -> EidError {
        s.parse::<Eid>().expect_err("parsed successfully!")
    }

    #[test]
    fn tests() {
        ipn_check("ipn:1.2", 1, 2);
        ipn_check("ipn:1.0", 1, 0);
        ipn_check("ipn:10.1", 10, 1);
        ipn_check("ipn:4294967295.4294967295", u32::MAX, u32::MAX);

        assert!("ipn:0.0".parse::<Eid>().unwrap().is_null());

        expect_error("");
        expect_error("ipn");
        expect_error("ipn:");
        expect_error("ipn:1");
        expect_error("ipn:1.");
        expect_error("ipn:.2");
        expect_error("ipn:1.2.3");
        expect_error("dtn://somewhere/else");
        expect_error("ipn:-1.2");
        expect_error("ipn:99999999999.2");
    }
}
