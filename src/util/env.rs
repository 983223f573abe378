//! Environment deserialization, modelled on the [`envy`] crate.
//!
//! Variables sharing a prefix (e.g. `KARMABOT_MAX_POINTS`) are stripped of that prefix and fed to
//! a `serde` map visitor, so any `Deserialize` struct with `SCREAMING_SNAKE_CASE` field names can
//! be populated straight from the process environment. Sequence fields are read as comma-separated
//! lists.
//!
//! [`envy`]: https://github.com/softprops/envy

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer};
use thiserror::Error;

/// Loads a `.env` file from the working directory (or its parents) into the process environment.
///
/// A missing file is not an error.
pub fn load_dotenv() -> EnvResult<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deserializes `T` from every process environment variable starting with `prefix`.
pub fn from_env<T>(prefix: &str) -> EnvResult<T>
where
    T: DeserializeOwned,
{
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));

    from_iter(prefix, vars)
}

/// Deserializes `T` from `(key, value)` pairs, keeping only the keys that start with `prefix`.
pub fn from_iter<T, Iter>(prefix: &str, vars: Iter) -> EnvResult<T>
where
    T: DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let entries = vars.into_iter().filter_map(|(key, raw)| {
        let field = key.strip_prefix(prefix)?.to_owned();
        Some((field, Value { key, raw }))
    });

    T::deserialize(MapDeserializer::new(entries))
}

/// A single variable's value, tagged with its full name for error reporting.
struct Value {
    key: String,
    raw: String,
}

impl<'de> IntoDeserializer<'de, EnvErr> for Value {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_scalar {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvErr>
            where
                V: de::Visitor<'de>,
            {
                match self.raw.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{}: while parsing '{}' (variable: {})",
                        e, self.raw, self.key
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Value {
    type Error = EnvErr;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.raw.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let key = self.key;
        let items = self
            .raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value {
                key: key.clone(),
                raw: item.to_owned(),
            })
            .collect::<Vec<_>>();

        SeqDeserializer::new(items.into_iter()).deserialize_seq(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.raw.trim().is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_enum(self.raw.trim().to_lowercase().into_deserializer())
    }

    parse_scalar! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i8 => deserialize_i8,
        i16 => deserialize_i16,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
    }

    serde::forward_to_deserialize_any! {
        f32 f64 char str string unit bytes byte_buf map
        unit_struct tuple_struct identifier tuple
        ignored_any struct
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable: {0}")]
    MissingValue(String),
}

impl de::Error for EnvErr {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvErr::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvErr::MissingValue(field.into())
    }
}
