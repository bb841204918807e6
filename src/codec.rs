use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::traits::ReplyCodec;

/// Default reply codec: the compact `postcard` wire format over serde.
///
/// Any reply type deriving `Serialize`/`Deserialize` round-trips through the
/// cache unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostcardCodec;

impl<P> ReplyCodec<P> for PostcardCodec
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Error = postcard::Error;

    fn encode(&self, reply: &P) -> Result<Vec<u8>, Self::Error> {
        postcard::to_stdvec(reply)
    }

    fn decode(&self, payload: &[u8]) -> Result<P, Self::Error> {
        postcard::from_bytes(payload)
    }
}
