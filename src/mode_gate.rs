//! `ModeGate` (C8): admission policy for events based on scan mode vs. the
//! set of modes a root is configured for. Scheduled scans are always
//! admitted, since they are the fallback source of truth that reconciles
//! missed change notifications.

use crate::config::OptionFlags;
use crate::entry::DetectionMode;

pub fn admit(event_mode: DetectionMode, root_mode_bits: OptionFlags) -> bool {
    match event_mode {
        DetectionMode::Scheduled => true,
        DetectionMode::Realtime => root_mode_bits.realtime_active(),
        DetectionMode::Whodata => root_mode_bits.whodata_active(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_always_admitted() {
        assert!(admit(DetectionMode::Scheduled, OptionFlags::empty()));
    }

    #[test]
    fn realtime_admitted_only_when_root_enables_it() {
        assert!(!admit(DetectionMode::Realtime, OptionFlags::empty()));
        assert!(admit(
            DetectionMode::Realtime,
            OptionFlags::from_bits(OptionFlags::REALTIME_ACTIVE)
        ));
    }

    #[test]
    fn whodata_admitted_only_when_root_enables_it() {
        assert!(!admit(DetectionMode::Whodata, OptionFlags::empty()));
        assert!(admit(
            DetectionMode::Whodata,
            OptionFlags::from_bits(OptionFlags::WHODATA_ACTIVE)
        ));
    }

    #[test]
    fn realtime_on_whodata_only_root_is_dropped() {
        assert!(!admit(
            DetectionMode::Realtime,
            OptionFlags::from_bits(OptionFlags::WHODATA_ACTIVE)
        ));
    }
}
