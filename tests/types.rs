// ABOUTME: Integration tests for validated identifier types.
// ABOUTME: Tests project name rules and color parsing and serialization.

use bascule::types::*;

mod project_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ProjectName::new("erp-prod").unwrap();
        assert_eq!(name.as_str(), "erp-prod");
        assert_eq!(name.to_string(), "erp-prod");
    }

    #[test]
    fn empty_returns_error() {
        assert!(matches!(ProjectName::new(""), Err(ProjectNameError::Empty)));
    }

    #[test]
    fn too_long_returns_error() {
        let long = "a".repeat(49);
        assert!(matches!(ProjectName::new(&long), Err(ProjectNameError::TooLong)));
    }

    #[test]
    fn valid_48_chars() {
        let name = "a".repeat(48);
        assert!(ProjectName::new(&name).is_ok());
    }

    #[test]
    fn hyphen_edges_return_errors() {
        assert!(matches!(
            ProjectName::new("-erp"),
            Err(ProjectNameError::StartsWithHyphen)
        ));
        assert!(matches!(
            ProjectName::new("erp-"),
            Err(ProjectNameError::EndsWithHyphen)
        ));
    }

    #[test]
    fn uppercase_and_symbols_return_errors() {
        assert!(matches!(
            ProjectName::new("ERP"),
            Err(ProjectNameError::NotLowercase)
        ));
        assert!(matches!(
            ProjectName::new("erp_prod"),
            Err(ProjectNameError::InvalidChar('_'))
        ));
    }

    #[test]
    fn deserializing_validates() {
        let ok: ProjectName = serde_yaml::from_str("shop").unwrap();
        assert_eq!(ok.as_str(), "shop");
        assert!(serde_yaml::from_str::<ProjectName>("Shop!").is_err());
    }

    #[test]
    fn scoped_names_stay_distinct_per_color() {
        let name = ProjectName::new("erp").unwrap();
        assert_ne!(name.scoped(Color::Blue), name.scoped(Color::Green));
    }
}

mod color_tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for color in Color::ALL {
            assert_eq!(color.to_string().parse::<Color>().unwrap(), color);
        }
    }

    #[test]
    fn unknown_color_is_an_error() {
        assert!("purple".parse::<Color>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Color::Green).unwrap(), "\"green\"");
        let parsed: Color = serde_json::from_str("\"blue\"").unwrap();
        assert_eq!(parsed, Color::Blue);
    }
}
