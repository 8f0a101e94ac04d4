//! # Filter Engine
//!
//! Decodes just enough of a LoRaWAN PHY payload (MHDR, DevAddr, FPort, and
//! for join requests JoinEUI/DevEUI) to evaluate per-service include/exclude
//! rules. Never verifies a MIC, decrypts FRMPayload, or otherwise assembles
//! a frame — that belongs to a network server, not the gateway.

use std::collections::HashSet;

/// LoRaWAN MHDR message type, the top 3 bits of the first PHY byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    RejoinRequest,
    Proprietary,
}

impl MType {
    fn from_mhdr(mhdr: u8) -> Self {
        match (mhdr >> 5) & 0x07 {
            0b000 => MType::JoinRequest,
            0b001 => MType::JoinAccept,
            0b010 => MType::UnconfirmedDataUp,
            0b011 => MType::UnconfirmedDataDown,
            0b100 => MType::ConfirmedDataUp,
            0b101 => MType::ConfirmedDataDown,
            0b110 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }

    fn is_data_uplink(self) -> bool {
        matches!(self, MType::UnconfirmedDataUp | MType::ConfirmedDataUp)
    }
}

/// The minimal set of fields the filter engine can extract from a PHY
/// payload. Any field may be absent if the payload was too short or the
/// frame kind doesn't carry it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFields {
    pub dev_addr: Option<u32>,
    pub f_port: Option<u8>,
    pub join_eui: Option<u64>,
    pub dev_eui: Option<u64>,
    /// The network ID embedded in a data uplink's DevAddr. LoRaWAN only
    /// carries the low 7 bits of NetID in DevAddr (as NwkID); that's the
    /// only part of NetID this gateway can see without a join server, so
    /// it's what the filter evaluates against.
    pub net_id: Option<u32>,
}

/// Minimally decodes a PHY payload for filter purposes. Returns `None` if
/// the payload is too short to contain even an MHDR, in which case every
/// field is treated as "no value available" by the caller.
pub fn decode_fields(phy_payload: &[u8]) -> Option<DecodedFields> {
    let mhdr = *phy_payload.first()?;
    let mtype = MType::from_mhdr(mhdr);

    match mtype {
        MType::JoinRequest | MType::RejoinRequest => {
            // JoinRequest: MHDR(1) | JoinEUI(8, LE) | DevEUI(8, LE) | DevNonce(2) | MIC(4)
            if phy_payload.len() < 23 {
                return Some(DecodedFields::default());
            }
            let join_eui = u64::from_le_bytes(phy_payload[1..9].try_into().ok()?);
            let dev_eui = u64::from_le_bytes(phy_payload[9..17].try_into().ok()?);
            Some(DecodedFields {
                join_eui: Some(join_eui),
                dev_eui: Some(dev_eui),
                ..Default::default()
            })
        }
        mt if mt.is_data_uplink() => {
            // MHDR(1) | DevAddr(4, LE) | FCtrl(1) | FCnt(2) | FOpts(0-15) | [FPort(1)] | ...
            if phy_payload.len() < 8 {
                return Some(DecodedFields::default());
            }
            let dev_addr = u32::from_le_bytes(phy_payload[1..5].try_into().ok()?);
            let f_ctrl = phy_payload[5];
            let fopts_len = (f_ctrl & 0x0F) as usize;
            let f_port_offset = 8 + fopts_len;
            let f_port = phy_payload.get(f_port_offset).copied();
            let net_id = Some(dev_addr >> 25);
            Some(DecodedFields {
                dev_addr: Some(dev_addr),
                f_port,
                net_id,
                ..Default::default()
            })
        }
        _ => Some(DecodedFields::default()),
    }
}

/// How a single field's filter should treat membership in its oracle set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    None,
    Include,
    Exclude,
}

/// A per-field filter: a mode plus the set of values it checks membership
/// against. Generic over the value type so one type serves DevAddr
/// (`u32`), FPort (`u8`), and the 64-bit EUIs.
#[derive(Debug, Clone)]
pub struct FieldFilter<T: std::hash::Hash + Eq> {
    pub mode: FilterMode,
    pub values: HashSet<T>,
}

impl<T: std::hash::Hash + Eq> FieldFilter<T> {
    pub fn none() -> Self {
        Self {
            mode: FilterMode::None,
            values: HashSet::new(),
        }
    }

    pub fn include(values: HashSet<T>) -> Self {
        Self {
            mode: FilterMode::Include,
            values,
        }
    }

    pub fn exclude(values: HashSet<T>) -> Self {
        Self {
            mode: FilterMode::Exclude,
            values,
        }
    }

    /// Evaluates this filter against an optionally-decoded field value.
    /// A decode failure (`None`) always passes — the field is skipped, not
    /// treated as an exclude match.
    fn passes(&self, value: Option<&T>) -> bool {
        match (self.mode, value) {
            (FilterMode::None, _) => true,
            (_, None) => true,
            (FilterMode::Include, Some(v)) => self.values.contains(v),
            (FilterMode::Exclude, Some(v)) => !self.values.contains(v),
        }
    }
}

/// The full set of per-field filters a service may configure.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub dev_addr: Option<FieldFilter<u32>>,
    pub f_port: Option<FieldFilter<u8>>,
    pub join_eui: Option<FieldFilter<u64>>,
    pub dev_eui: Option<FieldFilter<u64>>,
    pub net_id: Option<FieldFilter<u32>>,
}

/// Outcome of running a packet through a [`FilterSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOutcome {
    pub forward: bool,
    pub decode_failed: bool,
}

impl FilterSet {
    /// Evaluates the logical AND of every enabled field filter against the
    /// packet's PHY payload. A decode failure widens to "field skipped"
    /// (fail-open) but still bumps `decode_failed` for the stats aggregator.
    pub fn evaluate(&self, phy_payload: &[u8]) -> FilterOutcome {
        let decoded = decode_fields(phy_payload);
        let decode_failed = decoded.is_none();
        let fields = decoded.unwrap_or_default();

        let mut forward = true;
        if let Some(f) = &self.dev_addr {
            forward &= f.passes(fields.dev_addr.as_ref());
        }
        if let Some(f) = &self.f_port {
            forward &= f.passes(fields.f_port.as_ref());
        }
        if let Some(f) = &self.join_eui {
            forward &= f.passes(fields.join_eui.as_ref());
        }
        if let Some(f) = &self.dev_eui {
            forward &= f.passes(fields.dev_eui.as_ref());
        }
        if let Some(f) = &self.net_id {
            forward &= f.passes(fields.net_id.as_ref());
        }

        FilterOutcome {
            forward,
            decode_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_uplink(dev_addr: u32, f_port: u8) -> Vec<u8> {
        let mut buf = vec![0x40u8]; // MHDR: UnconfirmedDataUp
        buf.extend_from_slice(&dev_addr.to_le_bytes());
        buf.push(0x00); // FCtrl: no FOpts
        buf.extend_from_slice(&[0x01, 0x00]); // FCnt
        buf.push(f_port);
        buf.extend_from_slice(&[0xAA, 0xBB]); // FRMPayload + MIC stub
        buf
    }

    #[test]
    fn include_mode_passes_only_on_present_value() {
        let mut set = HashSet::new();
        set.insert(0x01020304u32);
        let filters = FilterSet {
            dev_addr: Some(FieldFilter::include(set)),
            ..Default::default()
        };
        assert!(filters.evaluate(&data_uplink(0x01020304, 1)).forward);
        assert!(!filters.evaluate(&data_uplink(0x0A0B0C0D, 1)).forward);
    }

    #[test]
    fn exclude_mode_passes_only_on_absent_value() {
        let mut set = HashSet::new();
        set.insert(0x01020304u32);
        let filters = FilterSet {
            dev_addr: Some(FieldFilter::exclude(set)),
            ..Default::default()
        };
        assert!(!filters.evaluate(&data_uplink(0x01020304, 1)).forward);
        assert!(filters.evaluate(&data_uplink(0x0A0B0C0D, 1)).forward);
    }

    #[test]
    fn disagreeing_filters_and_together() {
        let mut include_set = HashSet::new();
        include_set.insert(0x01020304u32);
        let mut port_exclude = HashSet::new();
        port_exclude.insert(1u8);
        let filters = FilterSet {
            dev_addr: Some(FieldFilter::include(include_set)),
            f_port: Some(FieldFilter::exclude(port_exclude)),
            ..Default::default()
        };
        // DevAddr matches include, but FPort=1 is excluded -> AND fails.
        assert!(!filters.evaluate(&data_uplink(0x01020304, 1)).forward);
    }

    #[test]
    fn net_id_filter_matches_devaddr_high_bits() {
        let mut set = HashSet::new();
        set.insert(127u32);
        let filters = FilterSet {
            net_id: Some(FieldFilter::include(set)),
            ..Default::default()
        };
        assert!(filters.evaluate(&data_uplink(0xFE000001, 1)).forward);
        assert!(!filters.evaluate(&data_uplink(0x02000001, 1)).forward);
    }

    #[test]
    fn short_payload_is_treated_as_decode_failure_and_fails_open() {
        let mut set = HashSet::new();
        set.insert(0x01020304u32);
        let filters = FilterSet {
            dev_addr: Some(FieldFilter::include(set)),
            ..Default::default()
        };
        let outcome = filters.evaluate(&[0x40, 0x01]);
        assert!(outcome.forward);
        assert!(outcome.decode_failed);
    }
}
