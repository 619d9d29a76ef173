use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Selection state of a single facet option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterState {
    /// Not constraining anything.
    #[default]
    Off,
    /// Entry must carry at least one of the group's included tokens.
    Include,
    /// Entry must carry every one of the group's `and` tokens.
    And,
    /// Entry must carry none of the group's excluded tokens.
    Exclude,
}

impl FilterState {
    /// Primary interaction: `Off → Include → And → Off`.
    ///
    /// An excluded option goes straight to `Include`, not back to `Off`.
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::Include,
            Self::Include => Self::And,
            Self::And => Self::Off,
            Self::Exclude => Self::Include,
        }
    }

    /// Contextual interaction: `Off → Exclude`, anything else `→ Off`.
    pub fn toggle_exclude(self) -> Self {
        match self {
            Self::Off => Self::Exclude,
            _ => Self::Off,
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Off
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Include => "include",
            Self::And => "and",
            Self::Exclude => "exclude",
        }
    }
}

impl Display for FilterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "include" | "or" => Ok(Self::Include),
            "and" => Ok(Self::And),
            "exclude" | "not" => Ok(Self::Exclude),
            other => Err(format!("unknown filter state '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FilterState::Off, FilterState::Include)]
    #[case(FilterState::Include, FilterState::And)]
    #[case(FilterState::And, FilterState::Off)]
    #[case(FilterState::Exclude, FilterState::Include)]
    fn test_cycle(#[case] from: FilterState, #[case] to: FilterState) {
        assert_eq!(from.cycle(), to);
    }

    #[rstest]
    #[case(FilterState::Off, FilterState::Exclude)]
    #[case(FilterState::Exclude, FilterState::Off)]
    #[case(FilterState::Include, FilterState::Off)]
    #[case(FilterState::And, FilterState::Off)]
    fn test_toggle_exclude(#[case] from: FilterState, #[case] to: FilterState) {
        assert_eq!(from.toggle_exclude(), to);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Include".parse::<FilterState>(), Ok(FilterState::Include));
        assert_eq!(" not ".parse::<FilterState>(), Ok(FilterState::Exclude));
        assert!("maybe".parse::<FilterState>().is_err());
    }
}
