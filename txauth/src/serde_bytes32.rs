use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_bytes(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    let bytes: Vec<u8> = serde_bytes::ByteBuf::deserialize(deserializer)?.into_vec();
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"32 bytes"))
}
