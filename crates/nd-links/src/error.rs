use nd_fluids::FluidError;
use thiserror::Error;

pub type LinkResult<T> = Result<T, LinkError>;

/// Link construction and checkpoint failures.
///
/// Invalid configuration aborts network construction loudly; the message
/// names the link and the rule it broke. Runtime degradations never surface
/// here; they are logged warnings and the affected sub-update is skipped.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("link '{link}' invalid config: {rule}")]
    InvalidConfig { link: String, rule: &'static str },

    #[error("link '{link}' invalid input: {rule}")]
    InvalidInput { link: String, rule: &'static str },

    #[error("link '{link}' checkpoint mismatch: {what}")]
    Checkpoint { link: String, what: &'static str },

    #[error("link '{link}' fluid error: {source}")]
    Fluid {
        link: String,
        #[source]
        source: FluidError,
    },
}

impl LinkError {
    pub fn fluid(link: &str, source: FluidError) -> Self {
        LinkError::Fluid {
            link: link.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_link_and_rule() {
        let err = LinkError::InvalidConfig {
            link: "accum1".into(),
            rule: "max conductance < 0",
        };
        let msg = err.to_string();
        assert!(msg.contains("accum1"));
        assert!(msg.contains("max conductance"));
    }
}
