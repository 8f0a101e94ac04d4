//! Shared protocol implementation for `Semtech` and `Ttn` services: both
//! speak the Semtech UDP packet-forwarder wire format verbatim.

use crate::codec::semtech::{
    Datagram, Header, Identifier, PullRespBody, PushDataBody, Rxpk, Stat, Txpk, TxAckBody,
    TxAckError,
};
use crate::error::GatewayError;
use crate::jit::JitError;
use crate::model::{CrcStatus, Modulation, RadioPacket, TxJob, TxMode};
use crate::service::{DecodedDownlink, ServiceProtocol};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;

fn datr_string(modulation: Modulation, datarate: u32, bandwidth: u32) -> String {
    match modulation {
        Modulation::LoRa => format!("SF{}BW{}", datarate, bandwidth / 1000),
        Modulation::Fsk => format!("{datarate}"),
        Modulation::Cw => "CW".to_string(),
    }
}

fn codr_string(coderate: u8) -> &'static str {
    match coderate {
        0x01 => "4/5",
        0x02 => "4/6",
        0x03 => "4/7",
        0x04 => "4/8",
        _ => "4/5",
    }
}

fn coderate_byte(codr: &str) -> u8 {
    match codr {
        "4/5" => 0x01,
        "4/6" => 0x02,
        "4/7" => 0x03,
        "4/8" => 0x04,
        _ => 0x01,
    }
}

pub(crate) fn packet_to_rxpk(packet: &RadioPacket) -> Rxpk {
    Rxpk {
        tmst: packet.count_us,
        time: None,
        chan: packet.if_chain,
        rfch: packet.rf_chain,
        freq: packet.freq_hz as f64 / 1_000_000.0,
        stat: match packet.crc_status {
            CrcStatus::Ok => 1,
            CrcStatus::Bad => -1,
            CrcStatus::None => 0,
        },
        modu: match packet.modulation {
            Modulation::LoRa => "LORA".to_string(),
            Modulation::Fsk => "FSK".to_string(),
            Modulation::Cw => "CW".to_string(),
        },
        datr: datr_string(packet.modulation, packet.datarate, packet.bandwidth),
        codr: codr_string(packet.coderate).to_string(),
        rssi: packet.rssi_chan.round() as i32,
        lsnr: packet.snr,
        size: packet.size(),
        data: STANDARD.encode(&packet.payload),
    }
}

pub(crate) fn txpk_to_job(txpk: &Txpk, rf_chain: u8) -> Result<TxJob, GatewayError> {
    let payload = STANDARD
        .decode(&txpk.data)
        .map_err(|e| GatewayError::DecodeError(format!("txpk.data base64: {e}")))?;
    let modulation = match txpk.modu.as_str() {
        "LORA" => Modulation::LoRa,
        "FSK" => Modulation::Fsk,
        other => {
            return Err(GatewayError::DecodeError(format!(
                "unsupported txpk.modu {other}"
            )))
        }
    };
    let (datarate, bandwidth) = match modulation {
        Modulation::LoRa => parse_datr_lora(&txpk.datr)?,
        _ => (txpk.datr.parse::<u32>().unwrap_or(50_000), 125_000),
    };

    Ok(TxJob {
        freq_hz: (txpk.freq * 1_000_000.0).round() as u32,
        tx_mode: if txpk.imme {
            TxMode::Immediate
        } else {
            TxMode::Timestamped
        },
        count_us: txpk.tmst.unwrap_or(0),
        rf_chain,
        rf_power: txpk.powe,
        modulation,
        bandwidth,
        datarate,
        coderate: coderate_byte(&txpk.codr),
        invert_pol: txpk.ipol,
        preamble: txpk.prea.unwrap_or(8),
        no_crc: txpk.ncrc,
        no_header: false,
        payload,
    })
}

fn parse_datr_lora(datr: &str) -> Result<(u32, u32), GatewayError> {
    let rest = datr
        .strip_prefix("SF")
        .ok_or_else(|| GatewayError::DecodeError(format!("malformed datr {datr}")))?;
    let bw_idx = rest
        .find("BW")
        .ok_or_else(|| GatewayError::DecodeError(format!("malformed datr {datr}")))?;
    let sf: u32 = rest[..bw_idx]
        .parse()
        .map_err(|_| GatewayError::DecodeError(format!("malformed datr {datr}")))?;
    let bw: u32 = rest[bw_idx + 2..]
        .parse()
        .map_err(|_| GatewayError::DecodeError(format!("malformed datr {datr}")))?;
    Ok((sf, bw * 1000))
}

pub(crate) fn tx_ack_error(result: Result<(), JitError>) -> TxAckError {
    match result {
        Ok(()) => TxAckError::None,
        Err(JitError::TooLate) => TxAckError::TooLate,
        Err(JitError::TooEarly) => TxAckError::TooEarly,
        Err(JitError::CollisionPacket) => TxAckError::CollisionPacket,
        Err(JitError::CollisionBeacon) => TxAckError::CollisionBeacon,
        Err(JitError::TxFreqOutOfRange) => TxAckError::TxFreq,
        Err(JitError::TxPowerUnsupported) => TxAckError::TxPower,
        Err(JitError::TxParamsInvalid) => TxAckError::TxFreq,
        Err(JitError::Full) => TxAckError::TooLate,
    }
}

/// Shared by `Semtech` and `Ttn`: the wire format is identical, only the
/// endpoint configuration differs, which lives in [`crate::config::ServerConfig`].
pub struct SemtechProtocol {
    pub gateway_eui: [u8; 8],
    pub rf_chain: u8,
}

impl SemtechProtocol {
    pub fn new(gateway_eui: [u8; 8], rf_chain: u8) -> Self {
        Self {
            gateway_eui,
            rf_chain,
        }
    }

    fn random_token() -> u16 {
        rand::thread_rng().gen()
    }

    /// Builds the periodic `stat` message body (not part of the uplink hot
    /// path, called on the service's own interval timer).
    pub fn encode_stat(&self, stat: Stat) -> Vec<u8> {
        let body = PushDataBody {
            rxpk: Vec::new(),
            stat: Some(stat),
        };
        let header = Header::new(Self::random_token(), Identifier::PushData, self.gateway_eui);
        Datagram {
            header,
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }
        .encode()
    }

    /// Builds a `PULL_DATA` keepalive datagram, tracked by the downlink
    /// worker's liveness state machine.
    pub fn encode_pull_data(&self) -> (u16, Vec<u8>) {
        let token = Self::random_token();
        let header = Header::new(token, Identifier::PullData, self.gateway_eui);
        (
            token,
            Datagram {
                header,
                body: Vec::new(),
            }
            .encode(),
        )
    }
}

impl ServiceProtocol for SemtechProtocol {
    fn encode_uplink(&self, packets: &[RadioPacket]) -> Result<Vec<u8>, GatewayError> {
        let body = PushDataBody {
            rxpk: packets.iter().map(packet_to_rxpk).collect(),
            stat: None,
        };
        let header = Header::new(Self::random_token(), Identifier::PushData, self.gateway_eui);
        Ok(Datagram {
            header,
            body: serde_json::to_vec(&body)?,
        }
        .encode())
    }

    fn decode_downlink(&self, data: &[u8]) -> Result<DecodedDownlink, GatewayError> {
        let datagram = Datagram::decode(data)
            .map_err(|e| GatewayError::SemtechFraming(e.to_string()))?;
        if datagram.header.identifier != Identifier::PullResp {
            return Err(GatewayError::DecodeError(
                "expected PULL_RESP datagram".to_string(),
            ));
        }
        let body: PullRespBody = serde_json::from_slice(&datagram.body)?;
        let job = txpk_to_job(&body.txpk, self.rf_chain)?;
        Ok(DecodedDownlink {
            job,
            ack_token: Some(datagram.header.token),
        })
    }

    fn encode_tx_ack(
        &self,
        ack_token: Option<u16>,
        result: Result<(), JitError>,
    ) -> Option<Vec<u8>> {
        let token = ack_token?;
        let header = Header::new(token, Identifier::TxAck, self.gateway_eui);
        let body = TxAckBody::new(tx_ack_error(result));
        Some(
            Datagram {
                header,
                body: serde_json::to_vec(&body).unwrap_or_default(),
            }
            .encode(),
        )
    }

    fn keepalive(&self) -> Option<Vec<u8>> {
        Some(self.encode_pull_data().1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CrcStatus;

    fn packet() -> RadioPacket {
        RadioPacket::new(
            868_100_000,
            0,
            Modulation::LoRa,
            7,
            CrcStatus::Ok,
            vec![0xDE, 0xAD, 0xBE, 0xEF],
            0,
        )
        .unwrap()
    }

    #[test]
    fn encode_uplink_produces_valid_push_data_datagram() {
        let protocol = SemtechProtocol::new([0; 8], 0);
        let bytes = protocol.encode_uplink(&[packet()]).unwrap();
        let datagram = Datagram::decode(&bytes).unwrap();
        assert_eq!(datagram.header.identifier, Identifier::PushData);
        let body: PushDataBody = serde_json::from_slice(&datagram.body).unwrap();
        assert_eq!(body.rxpk.len(), 1);
        assert_eq!(body.rxpk[0].datr, "SF7BW125");
    }

    #[test]
    fn decode_downlink_round_trips_known_scenario() {
        let protocol = SemtechProtocol::new([0; 8], 0);
        let txpk = Txpk {
            imme: false,
            tmst: Some(5_000_000),
            freq: 868.1,
            rfch: 0,
            powe: 14,
            modu: "LORA".to_string(),
            datr: "SF7BW125".to_string(),
            codr: "4/5".to_string(),
            fdev: None,
            ipol: true,
            prea: None,
            size: 12,
            data: STANDARD.encode([0u8; 12]),
            ncrc: false,
        };
        let body = PullRespBody { txpk };
        let header = Header::new(0xBEEF, Identifier::PullResp, [0; 8]);
        let datagram = Datagram {
            header,
            body: serde_json::to_vec(&body).unwrap(),
        }
        .encode();

        let decoded = protocol.decode_downlink(&datagram).unwrap();
        assert_eq!(decoded.ack_token, Some(0xBEEF));
        assert_eq!(decoded.job.count_us, 5_000_000);
        assert_eq!(decoded.job.freq_hz, 868_100_000);

        let ack = protocol
            .encode_tx_ack(decoded.ack_token, Ok(()))
            .unwrap();
        let ack_datagram = Datagram::decode(&ack).unwrap();
        assert_eq!(ack_datagram.header.token, 0xBEEF);
        assert_eq!(ack_datagram.header.identifier, Identifier::TxAck);
    }
}
