//! Report configuration types

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tally_core::{BlockNumber, BlockRange, GroupId};
use tally_economics::{ReportRequest, ScoringParams};

/// Complete tally configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    /// What the report covers
    #[serde(default)]
    pub report: ReportConfig,

    /// Opportunity scoring
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Read a TOML file; a missing file means defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Request for one block range
    pub fn to_request(&self, range: BlockRange) -> tally_core::Result<ReportRequest> {
        let report = &self.report;
        let request = ReportRequest {
            range,
            groups: report.groups.clone(),
            include_council: report.include_council,
            include_validators: report.include_validators,
            membership_group: report.membership_group.clone(),
            bounty_curator_group: report.bounty_curator_group.clone(),
            scoring: self.scoring.enabled.then(|| ScoringParams {
                term_length: self.scoring.term_length,
                default_percentile: self.scoring.default_percentile,
                percentiles: self.scoring.percentiles.clone(),
            }),
            concurrency: report.concurrency,
            tolerance_per_era: report.tolerance_per_era as u128,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Report scope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Working groups to track, by runtime module name
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupId>,

    #[serde(default = "default_true")]
    pub include_council: bool,

    #[serde(default = "default_true")]
    pub include_validators: bool,

    /// Group paying for invited memberships
    #[serde(default = "default_membership_group")]
    pub membership_group: Option<GroupId>,

    /// Group whose workers curate bounties
    #[serde(default)]
    pub bounty_curator_group: Option<GroupId>,

    /// Eras and groups read at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Reward drift allowed per era, in base units
    #[serde(default = "default_tolerance")]
    pub tolerance_per_era: u64,
}

fn default_groups() -> Vec<GroupId> {
    [
        "forumWorkingGroup",
        "storageWorkingGroup",
        "contentWorkingGroup",
        "membershipWorkingGroup",
        "operationsWorkingGroupAlpha",
        "gatewayWorkingGroup",
        "distributionWorkingGroup",
    ]
    .into_iter()
    .map(GroupId::from)
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_membership_group() -> Option<GroupId> {
    Some(GroupId::from("membershipWorkingGroup"))
}

fn default_concurrency() -> usize {
    4
}

fn default_tolerance() -> u64 {
    1
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            include_council: true,
            include_validators: true,
            membership_group: default_membership_group(),
            bounty_curator_group: None,
            concurrency: default_concurrency(),
            tolerance_per_era: default_tolerance(),
        }
    }
}

/// Opportunity scoring settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Council term length in blocks
    #[serde(default = "default_term_length")]
    pub term_length: BlockNumber,

    /// Target percentile, 1 to 100
    #[serde(default = "default_percentile")]
    pub default_percentile: u8,

    /// Per-group percentile overrides
    #[serde(default)]
    pub percentiles: BTreeMap<GroupId, u8>,
}

fn default_term_length() -> BlockNumber {
    // 14 days of 6 second blocks
    201_600
}

fn default_percentile() -> u8 {
    50
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            term_length: default_term_length(),
            default_percentile: default_percentile(),
            percentiles: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format, `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::TallyError;

    #[test]
    fn test_empty_file_is_default() {
        let config: TallyConfig = toml::from_str("").unwrap();
        assert_eq!(config.report.concurrency, 4);
        assert_eq!(config.report.groups.len(), 7);
        assert_eq!(config.scoring.term_length, 201_600);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = TallyConfig::load(Path::new("/nonexistent/tally.toml")).unwrap();
        assert!(config.report.include_council);
    }

    #[test]
    fn test_partial_overrides() {
        let config: TallyConfig = toml::from_str(
            r#"
            [report]
            groups = ["storageWorkingGroup"]
            include_validators = false
            bounty_curator_group = "operationsWorkingGroupBeta"

            [scoring]
            term_length = 1000
            default_percentile = 75

            [scoring.percentiles]
            storageWorkingGroup = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.report.groups, vec![GroupId::from("storageWorkingGroup")]);
        assert!(!config.report.include_validators);
        assert!(config.report.include_council);
        assert_eq!(config.scoring.default_percentile, 75);

        let request = config.to_request(BlockRange::new(0, 5_000)).unwrap();
        let scoring = request.scoring.unwrap();
        assert_eq!(scoring.percentile_for(&GroupId::from("storageWorkingGroup")), 100);
        assert_eq!(scoring.percentile_for(&GroupId::from("forumWorkingGroup")), 75);
        assert_eq!(
            request.bounty_curator_group,
            Some(GroupId::from("operationsWorkingGroupBeta"))
        );
    }

    #[test]
    fn test_scoring_disabled() {
        let mut config = TallyConfig::default();
        config.scoring.enabled = false;
        let request = config.to_request(BlockRange::new(0, 10)).unwrap();
        assert!(request.scoring.is_none());
    }

    #[test]
    fn test_invalid_request_rejected() {
        let config = TallyConfig::default();
        assert!(matches!(
            config.to_request(BlockRange::new(10, 10)),
            Err(TallyError::InconsistentRange(_))
        ));

        let mut config = TallyConfig::default();
        config.scoring.default_percentile = 101;
        assert!(matches!(
            config.to_request(BlockRange::new(0, 10)),
            Err(TallyError::InvalidParameter(_))
        ));
    }
}
