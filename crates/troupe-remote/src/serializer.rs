//! Pluggable payload serialization
//!
//! The transport serializes message payloads through a serializer pair that
//! also yields a stable type name per message. The default JSON serializer
//! consults a process-wide type registry: every message type that crosses
//! the wire must be registered up front with [`register_type`], which records
//! erased serialize and deserialize hooks keyed by `TypeId` and type name.

use crate::error::{RemoteError, RemoteResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use troupe_actor::{DynMessage, Message, Pid};

/// Serializes messages and names their types for the wire
pub trait Serializer: Send + Sync + 'static {
    /// Serialize a message payload
    fn serialize(&self, msg: &dyn Message) -> RemoteResult<Bytes>;

    /// The wire type name of a message
    fn type_name(&self, msg: &dyn Message) -> RemoteResult<&'static str>;
}

/// Reverses a [`Serializer`] on the receiving side
pub trait Deserializer: Send + Sync + 'static {
    /// Reconstruct a message from its payload and wire type name
    fn deserialize(&self, data: &[u8], type_name: &str) -> RemoteResult<DynMessage>;
}

type SerializeFn = fn(&dyn Message) -> RemoteResult<Vec<u8>>;
type DeserializeFn = fn(&[u8]) -> RemoteResult<DynMessage>;

struct RegisteredType {
    name: &'static str,
    serialize: SerializeFn,
}

struct TypeRegistry {
    by_type: HashMap<TypeId, RegisteredType>,
    by_name: HashMap<&'static str, DeserializeFn>,
}

fn registry() -> &'static RwLock<TypeRegistry> {
    static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = RwLock::new(TypeRegistry {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
        });
        register_into(&registry, entry::<Pid>());
        registry
    })
}

fn entry<T>() -> (TypeId, RegisteredType, DeserializeFn)
where
    T: Message + Serialize + DeserializeOwned,
{
    (
        TypeId::of::<T>(),
        RegisteredType {
            name: std::any::type_name::<T>(),
            serialize: serialize_erased::<T>,
        },
        deserialize_erased::<T>,
    )
}

fn register_into(registry: &RwLock<TypeRegistry>, entry: (TypeId, RegisteredType, DeserializeFn)) {
    let (type_id, registered, deserialize) = entry;
    let mut guard = registry.write().unwrap_or_else(PoisonError::into_inner);
    guard.by_name.insert(registered.name, deserialize);
    guard.by_type.insert(type_id, registered);
}

/// Make `T` sendable across the wire; idempotent
///
/// Both ends of a connection must register the same types before use.
pub fn register_type<T>()
where
    T: Message + Serialize + DeserializeOwned,
{
    register_into(registry(), entry::<T>());
}

fn serialize_erased<T>(msg: &dyn Message) -> RemoteResult<Vec<u8>>
where
    T: Message + Serialize,
{
    let typed = msg
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RemoteError::SerializeFailed {
            reason: "registered hook saw a different type".to_string(),
        })?;
    serde_json::to_vec(typed).map_err(|e| RemoteError::SerializeFailed {
        reason: e.to_string(),
    })
}

fn deserialize_erased<T>(data: &[u8]) -> RemoteResult<DynMessage>
where
    T: Message + DeserializeOwned,
{
    let typed: T = serde_json::from_slice(data).map_err(|e| RemoteError::DeserializeFailed {
        type_name: std::any::type_name::<T>().to_string(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(typed))
}

/// Default serializer: JSON payloads, names from the type registry
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, msg: &dyn Message) -> RemoteResult<Bytes> {
        let guard = registry().read().unwrap_or_else(PoisonError::into_inner);
        let registered = guard
            .by_type
            .get(&msg.as_any().type_id())
            .ok_or_else(|| RemoteError::UnregisteredMessage {
                message: format!("{msg:?}"),
            })?;
        (registered.serialize)(msg).map(Bytes::from)
    }

    fn type_name(&self, msg: &dyn Message) -> RemoteResult<&'static str> {
        let guard = registry().read().unwrap_or_else(PoisonError::into_inner);
        guard
            .by_type
            .get(&msg.as_any().type_id())
            .map(|registered| registered.name)
            .ok_or_else(|| RemoteError::UnregisteredMessage {
                message: format!("{msg:?}"),
            })
    }
}

impl Deserializer for JsonSerializer {
    fn deserialize(&self, data: &[u8], type_name: &str) -> RemoteResult<DynMessage> {
        let deserialize = {
            let guard = registry().read().unwrap_or_else(PoisonError::into_inner);
            guard.by_name.get(type_name).copied()
        };
        match deserialize {
            Some(deserialize) => deserialize(data),
            None => Err(RemoteError::UnknownTypeName {
                type_name: type_name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        symbol: String,
        qty: u32,
    }

    #[test]
    fn test_registered_type_roundtrip() {
        register_type::<OrderPlaced>();

        let serializer = JsonSerializer;
        let msg = OrderPlaced {
            symbol: "ABC".into(),
            qty: 7,
        };
        let name = serializer.type_name(&msg).unwrap();
        let data = serializer.serialize(&msg).unwrap();
        let back = serializer.deserialize(&data, name).unwrap();
        assert_eq!(back.downcast_ref::<OrderPlaced>(), Some(&msg));
    }

    #[test]
    fn test_pid_preregistered() {
        let serializer = JsonSerializer;
        let pid = Pid::new("127.0.0.1:4000", "echo/1");
        let name = serializer.type_name(&pid).unwrap();
        let data = serializer.serialize(&pid).unwrap();
        let back = serializer.deserialize(&data, name).unwrap();
        assert_eq!(back.downcast_ref::<Pid>(), Some(&pid));
    }

    #[test]
    fn test_unregistered_message_fails() {
        #[derive(Debug)]
        struct NeverRegistered;

        let serializer = JsonSerializer;
        assert!(matches!(
            serializer.serialize(&NeverRegistered),
            Err(RemoteError::UnregisteredMessage { .. })
        ));
        assert!(matches!(
            serializer.deserialize(b"{}", "no::such::Type"),
            Err(RemoteError::UnknownTypeName { .. })
        ));
    }

    #[test]
    fn test_register_type_idempotent() {
        register_type::<OrderPlaced>();
        register_type::<OrderPlaced>();
        let serializer = JsonSerializer;
        let msg = OrderPlaced {
            symbol: "XYZ".into(),
            qty: 1,
        };
        assert!(serializer.serialize(&msg).is_ok());
    }
}
