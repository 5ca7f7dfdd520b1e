// Save-time checks for the zone partition
use crate::zones::Configuration;

pub const GENERIC_SAVE_ERROR: &str = "Failed to save settings. Please try again.";

/// Check the zone partition and return every problem found, in order.
///
/// Each zone is checked for its start relative to the previous zone's end, for a
/// positive width, for the 100% ceiling and for negative values. A second pass
/// reports every adjacent pair that is not contiguous at whole-percent
/// granularity (`min(i) == max(i - 1) + 1`). Repeated messages are reported once,
/// at their first position. An empty result means the partition is valid.
///
/// The max heart rate is not checked here.
pub fn validate(config: &Configuration) -> Vec<String> {
    let mut errors = Vec::new();
    let mut previous_max = -1.0;

    for (index, _, zone) in config.zones.iter() {
        if zone.min <= previous_max {
            errors.push(format!("Zone {index} must start after the previous zone."));
        }
        if zone.max <= zone.min {
            errors.push(format!(
                "Zone {index}'s max percentage must be greater than its min percentage."
            ));
        }
        if zone.max > 100.0 {
            errors.push(format!("Zone {index}'s max percentage cannot exceed 100%."));
        }
        if zone.min < 0.0 || zone.max < 0.0 {
            errors.push(format!("Zone {index} cannot have negative values."));
        }
        previous_max = zone.max;
    }

    let zones: Vec<_> = config.zones.iter().collect();
    for pair in zones.windows(2) {
        let (prev_index, _, prev) = pair[0];
        let (index, _, current) = pair[1];
        if current.min != prev.max + 1.0 {
            errors.push(format!(
                "There is a gap between Zone {prev_index} and Zone {index}."
            ));
        }
    }

    dedup_preserving_order(errors)
}

fn dedup_preserving_order(messages: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.clone()))
        .collect()
}
