/// Deployment flavour of the harness; selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Anything that is not a production alias falls back to development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_production_aliases() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse(" prod "), Environment::Production);
    }

    #[test]
    fn test_parse_unknown_defaults_to_development() {
        assert_eq!(Environment::parse("staging"), Environment::Development);
        assert_eq!(Environment::parse(""), Environment::Development);
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for environment in [Environment::Development, Environment::Production] {
            assert_eq!(Environment::parse(environment.as_str()), environment);
        }
    }
}
