//! CloudWatch alarms and log groups

use super::KindBehavior;
use crate::error::{AwsError, Result};
use infraflow_core::{ResourceKind, ResourceSpec};

/// Retention periods CloudWatch Logs accepts, in days
const RETENTION_DAYS: &[i64] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

const COMPARISONS: &[&str] = &[
    "GreaterThanOrEqualToThreshold",
    "GreaterThanThreshold",
    "LessThanThreshold",
    "LessThanOrEqualToThreshold",
];

const STATISTICS: &[&str] = &["Average", "Sum", "Minimum", "Maximum", "SampleCount"];

pub(super) static ALARM: KindBehavior = KindBehavior {
    kind: ResourceKind::Alarm,
    immutable: &[],
    check: check_alarm,
};

pub(super) static LOG_GROUP: KindBehavior = KindBehavior {
    kind: ResourceKind::LogGroup,
    immutable: &["log_group_name"],
    check: check_log_group,
};

fn invalid(spec: &ResourceSpec, message: String) -> AwsError {
    AwsError::InvalidParameter(format!("{} '{}': {message}", spec.kind, spec.name))
}

fn check_alarm(spec: &ResourceSpec) -> Result<()> {
    if let Some(comparison) = spec.get_str("comparison")
        && !COMPARISONS.contains(&comparison)
    {
        return Err(invalid(spec, format!("unknown comparison '{comparison}'")));
    }
    if let Some(statistic) = spec.get_str("statistic")
        && !STATISTICS.contains(&statistic)
    {
        return Err(invalid(spec, format!("unknown statistic '{statistic}'")));
    }
    if let Some(period) = spec.get_integer("period")
        && !(matches!(period, 10 | 30) || (period >= 60 && period % 60 == 0))
    {
        return Err(invalid(
            spec,
            format!("period {period} must be 10, 30 or a multiple of 60"),
        ));
    }
    if let Some(evaluations) = spec.get_integer("evaluation_periods")
        && evaluations < 1
    {
        return Err(invalid(spec, "evaluation_periods must be at least 1".into()));
    }
    Ok(())
}

fn check_log_group(spec: &ResourceSpec) -> Result<()> {
    if let Some(days) = spec.get_integer("retention_days")
        && !RETENTION_DAYS.contains(&days)
    {
        return Err(invalid(
            spec,
            format!("retention_days {days} is not a CloudWatch retention period"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_core::AttrValue;

    #[test]
    fn test_alarm_period() {
        let alarm = |period| {
            ResourceSpec::new(ResourceKind::Alarm, "cpu-high")
                .with_attr("period", AttrValue::Integer(period))
        };
        assert!(check_alarm(&alarm(60)).is_ok());
        assert!(check_alarm(&alarm(30)).is_ok());
        assert!(check_alarm(&alarm(90)).is_err());
    }

    #[test]
    fn test_log_retention() {
        let logs = |days| {
            ResourceSpec::new(ResourceKind::LogGroup, "logs")
                .with_attr("retention_days", AttrValue::Integer(days))
        };
        assert!(check_log_group(&logs(30)).is_ok());
        assert!(check_log_group(&logs(31)).is_err());
    }
}
