use bytes::{Buf, BufMut, BytesMut};
use log::{error, trace};
use rasn::{ber, de::Decode};
use rasn_ldap::LdapMessage;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// BER framing of LDAP messages
pub(crate) struct LdapCodec;

impl Decoder for LdapCodec {
    type Item = LdapMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut decoder = ber::de::Decoder::new(src, ber::de::DecoderOptions::ber());
        let decoded = LdapMessage::decode(&mut decoder);
        let consumed = decoder.decoded_len();
        drop(decoder);

        match decoded {
            Ok(msg) => {
                src.advance(consumed);
                trace!("Decoded message {}: {} bytes", msg.message_id, consumed);
                Ok(Some(msg))
            }
            Err(ber::de::Error::Incomplete { needed }) => {
                trace!("Incomplete message, needed: {:?}", needed);
                Ok(None)
            }
            Err(e) => {
                error!("Decoder error: {}", e);
                Err(e.into())
            }
        }
    }
}

impl Encoder<LdapMessage> for LdapCodec {
    type Error = Error;

    fn encode(&mut self, item: LdapMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = ber::encode(&item)?;
        trace!("Encoded message {}: {} bytes", item.message_id, encoded.len());
        dst.put_slice(&encoded);
        Ok(())
    }
}
