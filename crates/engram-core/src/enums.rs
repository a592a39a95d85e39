//! Closed Enum Sets
//!
//! Every enum-valued tool parameter draws from exactly one of these types.
//! The wire literal lives in one place (the `as_str` table generated by the
//! macro); tool schemas, validators and storage all read from it, so the
//! schema list, the validator list and the domain definition cannot drift.

use serde::{Deserialize, Serialize};

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $literal:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $(
                #[doc = $literal]
                $variant,
            )+
        }

        impl $name {
            /// Every member of the closed set
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire literal
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $literal),+
                }
            }

            /// Wire literals of the whole set, for schemas and error messages
            pub fn names() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }

            /// Parse a wire literal
            pub fn parse_str(s: &str) -> Option<$name> {
                match s {
                    $($literal => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::parse_str(s).ok_or_else(|| {
                    format!(
                        "invalid {} '{}'; valid options: {}",
                        stringify!($name),
                        s,
                        $name::names().join(", ")
                    )
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }
    };
}

closed_enum! {
    /// Memory category
    MemoryCategory {
        Preference => "preference",
        Fact => "fact",
        Event => "event",
        Workflow => "workflow",
        Context => "context",
    }
}

closed_enum! {
    /// Problem domain of a GHAP episode
    Domain {
        Debugging => "debugging",
        Implementation => "implementation",
        Refactoring => "refactoring",
        Testing => "testing",
        Architecture => "architecture",
        Performance => "performance",
        Configuration => "configuration",
        Research => "research",
    }
}

closed_enum! {
    /// Approach taken in a GHAP episode
    Strategy {
        RootCauseAnalysis => "root-cause-analysis",
        HypothesisTesting => "hypothesis-testing",
        BinarySearch => "binary-search",
        IncrementalRefinement => "incremental-refinement",
        TestDriven => "test-driven",
        InstrumentAndObserve => "instrument-and-observe",
        PatternMatching => "pattern-matching",
        ResearchFirst => "research-first",
    }
}

closed_enum! {
    /// How a GHAP episode resolved
    Outcome {
        Confirmed => "confirmed",
        Falsified => "falsified",
        Abandoned => "abandoned",
    }
}

closed_enum! {
    /// Semantic axis of a resolved experience
    Axis {
        Full => "full",
        Strategy => "strategy",
        Surprise => "surprise",
        RootCause => "root_cause",
    }
}

closed_enum! {
    /// Kind of code unit the indexer extracts
    UnitType {
        Function => "function",
        Class => "class",
        Method => "method",
        Module => "module",
    }
}

closed_enum! {
    /// Languages the code indexer recognizes
    Language {
        Python => "python",
        TypeScript => "typescript",
        JavaScript => "javascript",
        Rust => "rust",
        Swift => "swift",
        Java => "java",
        C => "c",
        Cpp => "cpp",
        Sql => "sql",
    }
}

closed_enum! {
    /// Context assembler source type
    SourceKind {
        Experiences => "experiences",
        Values => "values",
        Memories => "memories",
        Code => "code",
        Commits => "commits",
    }
}

closed_enum! {
    /// Confidence tier of a resolved GHAP episode
    ConfidenceTier {
        Gold => "gold",
        Silver => "silver",
        Bronze => "bronze",
        Abandoned => "abandoned",
    }
}

impl ConfidenceTier {
    /// The single tier-weight table. Nothing else in the crate hard-codes a
    /// tier weight.
    pub fn weight(&self) -> f32 {
        match self {
            ConfidenceTier::Gold => 1.0,
            ConfidenceTier::Silver => 0.75,
            ConfidenceTier::Bronze => 0.45,
            ConfidenceTier::Abandoned => 0.2,
        }
    }

    /// Tier derived from an episode outcome
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Confirmed => ConfidenceTier::Gold,
            Outcome::Falsified => ConfidenceTier::Silver,
            Outcome::Abandoned => ConfidenceTier::Abandoned,
        }
    }
}

impl Axis {
    /// Vector collection holding this axis's embeddings
    pub fn collection_name(&self) -> &'static str {
        match self {
            Axis::Full => "experiences_full",
            Axis::Strategy => "experiences_strategy",
            Axis::Surprise => "experiences_surprise",
            Axis::RootCause => "experiences_root_cause",
        }
    }

    /// Axes that exist only for falsified episodes
    pub fn falsified_only(&self) -> bool {
        matches!(self, Axis::Surprise | Axis::RootCause)
    }
}

impl Language {
    /// Language recognized for a file extension, if any
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "py" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" => Some(Language::JavaScript),
            "rs" => Some(Language::Rust),
            "swift" => Some(Language::Swift),
            "java" => Some(Language::Java),
            "c" | "h" => Some(Language::C),
            "cpp" | "cc" | "hpp" => Some(Language::Cpp),
            "sql" => Some(Language::Sql),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_literal() {
        for domain in Domain::ALL {
            assert_eq!(Domain::parse_str(domain.as_str()), Some(*domain));
        }
        for strategy in Strategy::ALL {
            assert_eq!(Strategy::parse_str(strategy.as_str()), Some(*strategy));
        }
        for axis in Axis::ALL {
            assert_eq!(Axis::parse_str(axis.as_str()), Some(*axis));
        }
    }

    #[test]
    fn parse_errors_enumerate_valid_options() {
        let err = "warp-speed".parse::<Strategy>().unwrap_err();
        assert!(err.contains("root-cause-analysis"));
        assert!(err.contains("research-first"));
    }

    #[test]
    fn serde_uses_the_wire_literal() {
        let json = serde_json::to_string(&Strategy::RootCauseAnalysis).unwrap();
        assert_eq!(json, "\"root-cause-analysis\"");
        let parsed: Strategy = serde_json::from_str("\"binary-search\"").unwrap();
        assert_eq!(parsed, Strategy::BinarySearch);
        assert!(serde_json::from_str::<Outcome>("\"maybe\"").is_err());
    }

    #[test]
    fn tier_weights_are_ordered() {
        assert!(ConfidenceTier::Gold.weight() > ConfidenceTier::Silver.weight());
        assert!(ConfidenceTier::Silver.weight() > ConfidenceTier::Bronze.weight());
        assert!(ConfidenceTier::Bronze.weight() > ConfidenceTier::Abandoned.weight());
    }

    #[test]
    fn tier_from_outcome() {
        assert_eq!(
            ConfidenceTier::from_outcome(Outcome::Confirmed),
            ConfidenceTier::Gold
        );
        assert_eq!(
            ConfidenceTier::from_outcome(Outcome::Falsified),
            ConfidenceTier::Silver
        );
        assert_eq!(
            ConfidenceTier::from_outcome(Outcome::Abandoned),
            ConfidenceTier::Abandoned
        );
    }

    #[test]
    fn falsified_only_axes() {
        assert!(!Axis::Full.falsified_only());
        assert!(!Axis::Strategy.falsified_only());
        assert!(Axis::Surprise.falsified_only());
        assert!(Axis::RootCause.falsified_only());
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("exe"), None);
    }
}
