pub mod redis_storage_accessor;

pub use redis_storage_accessor::{
    DefaultValueSerializer, JsonValueSerializer, RedisStorageAccessor, ValueSerializer,
};
