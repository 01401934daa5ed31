use thiserror::Error;

pub type TableResult<T> = Result<T, TableError>;

#[derive(Error, Debug, Clone)]
pub enum TableError {
    #[error("Invalid table configuration: {what}")]
    InvalidConfig { what: &'static str },

    #[error("Out of range: {what} = {value} outside [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_rule() {
        let err = TableError::InvalidConfig {
            what: "axis not strictly ordered",
        };
        assert!(err.to_string().contains("strictly ordered"));
    }
}
