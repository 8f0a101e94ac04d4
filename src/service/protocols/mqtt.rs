//! MQTT upstream service: publishes the same `rxpk`/`txpk` JSON bodies the
//! Semtech protocol uses, without the 12-byte binary envelope — the broker's
//! topic already does the framing a token-keyed header exists for on raw UDP.

use super::semtech::{packet_to_rxpk, tx_ack_error, txpk_to_job};
use crate::codec::semtech::{PullRespBody, PushDataBody, TxAckBody};
use crate::error::GatewayError;
use crate::jit::JitError;
use crate::model::RadioPacket;
use crate::service::{DecodedDownlink, ServiceProtocol};

/// Speaks the Semtech JSON body format over an MQTT transport rather than
/// framed UDP datagrams.
pub struct MqttProtocol {
    rf_chain: u8,
}

impl MqttProtocol {
    pub fn new(rf_chain: u8) -> Self {
        Self { rf_chain }
    }
}

impl ServiceProtocol for MqttProtocol {
    fn encode_uplink(&self, packets: &[RadioPacket]) -> Result<Vec<u8>, GatewayError> {
        let body = PushDataBody {
            rxpk: packets.iter().map(packet_to_rxpk).collect(),
            stat: None,
        };
        Ok(serde_json::to_vec(&body)?)
    }

    fn decode_downlink(&self, data: &[u8]) -> Result<DecodedDownlink, GatewayError> {
        let body: PullRespBody = serde_json::from_slice(data)?;
        let job = txpk_to_job(&body.txpk, self.rf_chain)?;
        Ok(DecodedDownlink {
            job,
            ack_token: None,
        })
    }

    fn encode_tx_ack(
        &self,
        _ack_token: Option<u16>,
        result: Result<(), JitError>,
    ) -> Option<Vec<u8>> {
        let body = TxAckBody::new(tx_ack_error(result));
        serde_json::to_vec(&body).ok()
    }

    // MQTT's own keepalive (PINGREQ/PINGRESP) already covers connection
    // liveness at the broker level; no application-level keepalive needed.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::semtech::Txpk;
    use crate::model::{CrcStatus, Modulation};

    fn packet() -> RadioPacket {
        RadioPacket::new(868_100_000, 0, Modulation::LoRa, 7, CrcStatus::Ok, vec![1, 2, 3], 0)
            .unwrap()
    }

    #[test]
    fn encode_uplink_produces_push_data_body_json() {
        let protocol = MqttProtocol::new(0);
        let bytes = protocol.encode_uplink(&[packet()]).unwrap();
        let body: PushDataBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.rxpk.len(), 1);
    }

    #[test]
    fn decode_downlink_parses_bare_pull_resp_body() {
        let protocol = MqttProtocol::new(0);
        let body = PullRespBody {
            txpk: Txpk {
                imme: false,
                tmst: Some(1_000_000),
                freq: 868.1,
                rfch: 0,
                powe: 14,
                modu: "LORA".to_string(),
                datr: "SF7BW125".to_string(),
                codr: "4/5".to_string(),
                fdev: None,
                ipol: true,
                prea: None,
                size: 3,
                data: "AQID".to_string(),
                ncrc: false,
            },
        };
        let bytes = serde_json::to_vec(&body).unwrap();
        let decoded = protocol.decode_downlink(&bytes).unwrap();
        assert_eq!(decoded.job.count_us, 1_000_000);
        assert!(decoded.ack_token.is_none());
    }
}
