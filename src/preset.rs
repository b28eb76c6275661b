//! Standard parameter layout of the virtual device
//!
//! Registered at device construction. Addresses follow the unit's NRPN map:
//! page 0x00 holds strings, page 0x04 the rig, pages 0x32-0x3D the effect
//! slots and pages 0x7C/0x7D the tuner and tempo telemetry.

use crate::error::ParameterError;
use crate::parameter::{EntryHandle, ParameterEntry, ParameterStore};

/// Parameter set: rig basics
pub const SET_RIG_BASICS: u8 = 1;
/// Parameter set: rig details and effect slots
pub const SET_RIG_DETAILS: u8 = 2;

pub const RIG_NAME: (u8, u8) = (0x00, 0x01);
pub const RIG_AUTHOR: (u8, u8) = (0x00, 0x02);
pub const AMP_NAME: (u8, u8) = (0x00, 0x10);
pub const CAB_NAME: (u8, u8) = (0x00, 0x20);

pub const RIG_TEMPO: (u8, u8) = (0x04, 0x00);
pub const RIG_VOLUME: (u8, u8) = (0x04, 0x01);
pub const MORPH_STATE: (u8, u8) = (0x04, 0x0B);

pub const TEMPO_DISPLAY: (u8, u8) = (0x7C, 0x00);
pub const TUNER_DEVIATION: (u8, u8) = (0x7C, 0x0F);
pub const TUNER_NOTE: (u8, u8) = (0x7D, 0x54);

pub const CC_VOLUME_PEDAL: u8 = 7;
pub const CC_TAP_TEMPO: u8 = 30;
pub const CC_MORPH_BUTTON: u8 = 80;

/// Scale of the volume pedal CC onto the 14-bit range
pub const VOLUME_PEDAL_SCALE: u16 = 129;

/// Effect slot pages: A, B, C, D, X, MOD, DLY, REV
pub const EFFECT_SLOTS: [(&str, u8); 8] = [
    ("a", 0x32),
    ("b", 0x33),
    ("c", 0x34),
    ("d", 0x35),
    ("x", 0x38),
    ("mod", 0x3A),
    ("dly", 0x3C),
    ("rev", 0x3D),
];
/// Effect type within a slot page
pub const SLOT_TYPE: u8 = 0x00;
/// Effect on/off within a slot page
pub const SLOT_STATE: u8 = 0x03;

/// Handles the device's controllers need
#[derive(Debug, Clone, Copy)]
pub struct PresetHandles {
    pub morph_state: EntryHandle,
    pub morph_button: EntryHandle,
    pub tempo_display: EntryHandle,
    pub tap_tempo: EntryHandle,
    pub tuner_note: EntryHandle,
    pub tuner_deviation: EntryHandle,
}

/// Register the standard layout
pub fn register(store: &mut ParameterStore) -> Result<PresetHandles, ParameterError> {
    let both = [SET_RIG_BASICS, SET_RIG_DETAILS];

    store.init(
        ParameterEntry::text(RIG_NAME.0, RIG_NAME.1)
            .named("rig_name")
            .with_value("Virtual Rig")
            .in_sets(both),
    )?;
    store.init(
        ParameterEntry::text(RIG_AUTHOR.0, RIG_AUTHOR.1)
            .named("rig_author")
            .in_sets([SET_RIG_DETAILS]),
    )?;
    store.init(
        ParameterEntry::text(AMP_NAME.0, AMP_NAME.1)
            .named("amp_name")
            .with_value("Clean")
            .in_sets([SET_RIG_DETAILS]),
    )?;
    store.init(
        ParameterEntry::text(CAB_NAME.0, CAB_NAME.1)
            .named("cab_name")
            .in_sets([SET_RIG_DETAILS]),
    )?;
    store.init(
        ParameterEntry::numeric(RIG_TEMPO.0, RIG_TEMPO.1)
            .named("rig_tempo")
            .in_sets([SET_RIG_DETAILS]),
    )?;
    store.init(
        ParameterEntry::numeric(RIG_VOLUME.0, RIG_VOLUME.1)
            .named("rig_volume")
            .with_value(8192)
            .in_sets(both),
    )?;

    for (slot, page) in EFFECT_SLOTS {
        store.init(
            ParameterEntry::numeric(page, SLOT_TYPE)
                .named(format!("slot_{}_type", slot))
                .in_sets([SET_RIG_DETAILS]),
        )?;
        store.init(
            ParameterEntry::numeric(page, SLOT_STATE)
                .named(format!("slot_{}_state", slot))
                .in_sets([SET_RIG_DETAILS]),
        )?;
    }

    let morph_state = store.init(
        ParameterEntry::numeric(MORPH_STATE.0, MORPH_STATE.1)
            .named("morph_state")
            .in_sets(both),
    )?;
    let tempo_display = store.init(
        ParameterEntry::numeric(TEMPO_DISPLAY.0, TEMPO_DISPLAY.1).named("tempo_display"),
    )?;
    let tuner_note =
        store.init(ParameterEntry::numeric(TUNER_NOTE.0, TUNER_NOTE.1).named("tuner_note"))?;
    let tuner_deviation = store.init(
        ParameterEntry::numeric(TUNER_DEVIATION.0, TUNER_DEVIATION.1)
            .named("tuner_deviation")
            .with_value(8192),
    )?;

    store.init(
        ParameterEntry::cc_scaled(CC_VOLUME_PEDAL, VOLUME_PEDAL_SCALE).named("volume_pedal"),
    )?;
    let tap_tempo = store.init(ParameterEntry::cc(CC_TAP_TEMPO).named("tap_tempo"))?;
    let morph_button = store.init(ParameterEntry::cc(CC_MORPH_BUTTON).named("morph_button"))?;
    store.init(ParameterEntry::program_change().named("rig_select"))?;

    Ok(PresetHandles {
        morph_state,
        morph_button,
        tempo_display,
        tap_tempo,
        tuner_note,
        tuner_deviation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::KeyId;

    #[test]
    fn test_register_layout() {
        let mut store = ParameterStore::new();
        let handles = register(&mut store).unwrap();

        assert_eq!(store.len(), 6 + 2 * EFFECT_SLOTS.len() + 4 + 4);
        assert_eq!(store.find(KeyId::Nrpn(0x04, 0x0B)), Some(handles.morph_state));
        assert_eq!(store.find(KeyId::Cc(CC_TAP_TEMPO)), Some(handles.tap_tempo));
        assert!(store.find_by_name("slot_rev_state").is_some());
        assert!(store.find(KeyId::Pc).is_some());
    }

    #[test]
    fn test_register_twice_is_duplicate() {
        let mut store = ParameterStore::new();
        register(&mut store).unwrap();
        assert!(matches!(
            register(&mut store),
            Err(ParameterError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_telemetry_is_not_pushed_with_sets() {
        let mut store = ParameterStore::new();
        register(&mut store).unwrap();

        let names: Vec<String> = store
            .entries_in_set(SET_RIG_BASICS)
            .map(|e| e.display_name())
            .collect();
        assert_eq!(names, vec!["rig_name", "rig_volume", "morph_state"]);
    }
}
