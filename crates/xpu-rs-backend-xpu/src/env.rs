use std::env;
use std::sync::OnceLock;

static XPU_CAT_FORCE_FALLBACK: OnceLock<bool> = OnceLock::new();
static XPU_COMPUTE_UNITS: OnceLock<Option<u32>> = OnceLock::new();
static XPU_MAX_WORK_GROUP_SIZE: OnceLock<Option<u32>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_positive(name: &str) -> Option<u32> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            log::warn!("ignoring {name}={raw:?}: expected a positive integer");
            None
        }
    }
}

/// `XPU_CAT_FORCE_FALLBACK`: route every concatenation through the per-input copy path.
pub(crate) fn cat_force_fallback() -> bool {
    *XPU_CAT_FORCE_FALLBACK.get_or_init(|| match env::var("XPU_CAT_FORCE_FALLBACK") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// `XPU_COMPUTE_UNITS`: overrides the simulated device's compute-unit count.
pub(crate) fn compute_units() -> Option<u32> {
    *XPU_COMPUTE_UNITS.get_or_init(|| parse_positive("XPU_COMPUTE_UNITS"))
}

/// `XPU_MAX_WORK_GROUP_SIZE`: overrides the simulated device's work-group limit.
pub(crate) fn max_work_group_size() -> Option<u32> {
    *XPU_MAX_WORK_GROUP_SIZE.get_or_init(|| parse_positive("XPU_MAX_WORK_GROUP_SIZE"))
}

#[cfg(test)]
mod tests {
    use super::parse_bool;

    #[test]
    fn parses_truthy_values() {
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("1"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }
}
