//! Profile and parameter domain rules.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length of a profile name.
pub const MAX_PROFILE_NAME_LEN: usize = 255;

/// Profile types recognized by the control plane.
///
/// The wire representation is the upper-case identifier used by cache
/// servers and routers (e.g. `ATS_PROFILE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileType {
    #[serde(rename = "ATS_PROFILE")]
    CacheServer,
    #[serde(rename = "TR_PROFILE")]
    TrafficRouter,
    #[serde(rename = "TM_PROFILE")]
    TrafficMonitor,
    #[serde(rename = "TS_PROFILE")]
    TrafficStats,
    #[serde(rename = "TP_PROFILE")]
    TrafficPortal,
    #[serde(rename = "INFLUXDB_PROFILE")]
    InfluxDb,
    #[serde(rename = "RIAK_PROFILE")]
    Riak,
    #[serde(rename = "SPLUNK_PROFILE")]
    Splunk,
    #[serde(rename = "DS_PROFILE")]
    DeliveryService,
    #[serde(rename = "ORG_PROFILE")]
    Origin,
    #[serde(rename = "KAFKA_PROFILE")]
    Kafka,
    #[serde(rename = "LOGSTASH_PROFILE")]
    Logstash,
    #[serde(rename = "ES_PROFILE")]
    ElasticSearch,
    #[serde(rename = "GROVE_PROFILE")]
    Grove,
    #[serde(rename = "UNK_PROFILE")]
    Unknown,
}

impl ProfileType {
    pub const ALL: [ProfileType; 15] = [
        Self::CacheServer,
        Self::TrafficRouter,
        Self::TrafficMonitor,
        Self::TrafficStats,
        Self::TrafficPortal,
        Self::InfluxDb,
        Self::Riak,
        Self::Splunk,
        Self::DeliveryService,
        Self::Origin,
        Self::Kafka,
        Self::Logstash,
        Self::ElasticSearch,
        Self::Grove,
        Self::Unknown,
    ];

    /// Parse from the wire identifier.
    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownProfileType(s.to_string()))
    }

    /// Get the wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheServer => "ATS_PROFILE",
            Self::TrafficRouter => "TR_PROFILE",
            Self::TrafficMonitor => "TM_PROFILE",
            Self::TrafficStats => "TS_PROFILE",
            Self::TrafficPortal => "TP_PROFILE",
            Self::InfluxDb => "INFLUXDB_PROFILE",
            Self::Riak => "RIAK_PROFILE",
            Self::Splunk => "SPLUNK_PROFILE",
            Self::DeliveryService => "DS_PROFILE",
            Self::Origin => "ORG_PROFILE",
            Self::Kafka => "KAFKA_PROFILE",
            Self::Logstash => "LOGSTASH_PROFILE",
            Self::ElasticSearch => "ES_PROFILE",
            Self::Grove => "GROVE_PROFILE",
            Self::Unknown => "UNK_PROFILE",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a profile name: non-empty, bounded, and free of spaces.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidProfile("name cannot be blank".to_string()));
    }
    if name.contains(' ') {
        return Err(Error::InvalidProfile(
            "name cannot contain spaces".to_string(),
        ));
    }
    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(Error::InvalidProfile(format!(
            "name must be at most {MAX_PROFILE_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Fields every profile write must carry, prior to any storage lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub description: String,
    pub profile_type: String,
    pub cdn_id: i64,
    pub routing_disabled: bool,
}

impl ProfileDraft {
    /// Validate the draft and resolve its type.
    ///
    /// All problems are collected so the caller sees every offending field at
    /// once, matching how the API reports validation failures.
    pub fn validate(&self) -> Result<ProfileType> {
        let mut problems = Vec::new();

        if let Err(Error::InvalidProfile(msg)) = validate_profile_name(&self.name) {
            problems.push(msg);
        }
        if self.description.is_empty() {
            problems.push("description cannot be blank".to_string());
        }
        if self.cdn_id <= 0 {
            problems.push("cdn must reference an existing CDN".to_string());
        }

        let profile_type = if self.profile_type.is_empty() {
            problems.push("type cannot be blank".to_string());
            None
        } else {
            match ProfileType::parse(&self.profile_type) {
                Ok(t) => Some(t),
                Err(_) => {
                    problems.push(format!("type '{}' is not a valid profile type", self.profile_type));
                    None
                }
            }
        };

        match profile_type {
            Some(t) if problems.is_empty() => Ok(t),
            _ => Err(Error::InvalidProfile(problems.join("; "))),
        }
    }
}

/// Validate the composite key of a parameter.
pub fn validate_parameter(name: &str, config_file: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidParameter("name cannot be blank".to_string()));
    }
    if config_file.is_empty() {
        return Err(Error::InvalidParameter(
            "configFile cannot be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProfileDraft {
        ProfileDraft {
            name: "EDGE1".to_string(),
            description: "edge tier".to_string(),
            profile_type: "ATS_PROFILE".to_string(),
            cdn_id: 1,
            routing_disabled: false,
        }
    }

    #[test]
    fn profile_type_round_trips_wire_names() {
        for t in ProfileType::ALL {
            assert_eq!(ProfileType::parse(t.as_str()).unwrap(), t);
        }
        assert!(ProfileType::parse("ats_profile").is_err());
        assert!(ProfileType::parse("").is_err());
    }

    #[test]
    fn profile_type_serde_uses_wire_names() {
        let json = serde_json::to_string(&ProfileType::TrafficRouter).unwrap();
        assert_eq!(json, "\"TR_PROFILE\"");
    }

    #[test]
    fn name_rules() {
        validate_profile_name("profile-2").unwrap();
        let err = validate_profile_name("Profile Copy").unwrap_err();
        assert!(err.to_string().contains("cannot contain spaces"));
        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name(&"a".repeat(MAX_PROFILE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn valid_draft_resolves_type() {
        assert_eq!(draft().validate().unwrap(), ProfileType::CacheServer);
    }

    #[test]
    fn invalid_drafts_are_rejected() {
        let cases = [
            ProfileDraft {
                name: String::new(),
                description: String::new(),
                profile_type: String::new(),
                cdn_id: 0,
                routing_disabled: false,
            },
            ProfileDraft {
                cdn_id: 0,
                ..draft()
            },
            ProfileDraft {
                description: String::new(),
                ..draft()
            },
            ProfileDraft {
                name: String::new(),
                ..draft()
            },
            ProfileDraft {
                profile_type: String::new(),
                ..draft()
            },
            ProfileDraft {
                profile_type: "NOT_A_TYPE".to_string(),
                ..draft()
            },
        ];
        for case in cases {
            assert!(case.validate().is_err(), "expected {case:?} to be rejected");
        }
    }

    #[test]
    fn draft_errors_are_collected() {
        let err = ProfileDraft {
            name: "has space".to_string(),
            description: String::new(),
            ..draft()
        }
        .validate()
        .unwrap_err()
        .to_string();
        assert!(err.contains("cannot contain spaces"));
        assert!(err.contains("description cannot be blank"));
    }

    #[test]
    fn parameter_rules() {
        validate_parameter("location", "records.config").unwrap();
        assert!(validate_parameter("", "records.config").is_err());
        assert!(validate_parameter("location", "").is_err());
    }
}
