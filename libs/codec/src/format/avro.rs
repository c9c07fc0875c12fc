use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use apache_avro::schema::{DecimalSchema, NamesRef, ResolvedSchema};
use apache_avro::types::Value;
use apache_avro::{BigDecimal, Days, Decimal, Duration, Millis, Months, Schema, Uuid};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde_json::Value as Json;

use logscope_api::{CodecError, MessageDecoder, MessageEncoder, MessageFormat, SchemaRef};

use super::parse_json_input;
use crate::schema_registry::{ParsedSchema, SchemaRegistry};
use crate::wire::{split_schema_header, write_schema_header};

// ═══════════════════════════════════════════════════════════════
//  AvroRegistryCodec
// ═══════════════════════════════════════════════════════════════

/// AVRO через schema registry. Decode берёт схему по id из заголовка записи,
/// encode — последнюю версию subject'а topic'а.
pub struct AvroRegistryCodec {
    registry: Arc<SchemaRegistry>,
    subject: String,
}

impl AvroRegistryCodec {
    pub fn new(registry: Arc<SchemaRegistry>, subject: String) -> Self {
        Self { registry, subject }
    }
}

fn expect_avro(parsed: &ParsedSchema, schema: SchemaRef) -> Result<&Schema, CodecError> {
    match parsed {
        ParsedSchema::Avro(schema) => Ok(schema),
        ParsedSchema::Protobuf(_) => Err(CodecError::Schema {
            schema,
            detail: "registered schema is not avro".into(),
        }),
    }
}

impl MessageDecoder for AvroRegistryCodec {
    fn decode<'a>(
        &'a self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            let (schema_id, mut payload) = split_schema_header(data)?;
            let parsed = self.registry.by_id(schema_id).await?;
            let schema = expect_avro(&parsed, SchemaRef::Id(schema_id))?;
            let types = AvroTypes::of(schema, SchemaRef::Id(schema_id))?;
            let avro_value = apache_avro::from_avro_datum(schema, &mut payload, None)
                .map_err(|e| CodecError::malformed(format!("avro decode: {e}")))?;
            types.to_json(&avro_value, schema)
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Avro
    }
}

impl MessageEncoder for AvroRegistryCodec {
    fn encode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, CodecError>> + Send + 'a>> {
        Box::pin(async move {
            let value = parse_json_input(text)?;
            let (schema_id, parsed) = self.registry.latest(&self.subject).await?;
            let schema = expect_avro(&parsed, SchemaRef::Subject(self.subject.clone()))?;
            let types = AvroTypes::of(schema, SchemaRef::Subject(self.subject.clone()))?;
            let avro_value = types.from_json(&value, schema)?;
            let datum = apache_avro::to_avro_datum(schema, avro_value)
                .map_err(|e| CodecError::malformed(format!("avro encode: {e}")))?;

            let mut buf = Vec::with_capacity(5 + datum.len());
            write_schema_header(schema_id, &mut buf);
            buf.extend_from_slice(&datum);
            Ok(buf)
        })
    }

    fn format(&self) -> MessageFormat {
        MessageFormat::Avro
    }
}

// ═══════════════════════════════════════════════════════════════
//  Avro ↔ JSON conversion
// ═══════════════════════════════════════════════════════════════

/// Схема записи вместе с её именованными типами: поле вида `"Addr"`
/// парсится в `Schema::Ref` и разрешается по этой таблице.
struct AvroTypes<'s> {
    names: NamesRef<'s>,
}

impl<'s> AvroTypes<'s> {
    fn of(schema: &'s Schema, schema_ref: SchemaRef) -> Result<Self, CodecError> {
        let resolved = ResolvedSchema::try_from(schema).map_err(|e| CodecError::Schema {
            schema: schema_ref,
            detail: format!("avro named types: {e}"),
        })?;
        Ok(Self {
            names: resolved.get_names().clone(),
        })
    }

    fn resolve(&self, schema: &'s Schema) -> Result<&'s Schema, CodecError> {
        match schema {
            Schema::Ref { name } => self
                .names
                .get(name)
                .copied()
                .ok_or_else(|| CodecError::malformed(format!("avro: unresolved named type {name}"))),
            other => Ok(other),
        }
    }

    /// Datum → JSON. Схема нужна для decimal (scale) и для разбора union/record.
    fn to_json(&self, value: &Value, schema: &'s Schema) -> Result<Json, CodecError> {
        let schema = self.resolve(schema)?;
        let json = match (value, schema) {
            (Value::Null, _) => Json::Null,
            (Value::Boolean(b), _) => Json::Bool(*b),
            (Value::Int(i) | Value::Date(i) | Value::TimeMillis(i), _) => serde_json::json!(i),
            (
                Value::Long(l)
                | Value::TimeMicros(l)
                | Value::TimestampMillis(l)
                | Value::TimestampMicros(l)
                | Value::TimestampNanos(l)
                | Value::LocalTimestampMillis(l)
                | Value::LocalTimestampMicros(l)
                | Value::LocalTimestampNanos(l),
                _,
            ) => serde_json::json!(l),
            (Value::Float(f), _) => serde_json::json!(f),
            (Value::Double(d), _) => serde_json::json!(d),
            (Value::Bytes(b) | Value::Fixed(_, b), _) => Json::String(B64.encode(b)),
            (Value::String(s) | Value::Enum(_, s), _) => Json::String(s.clone()),
            (Value::Uuid(u), _) => Json::String(u.to_string()),
            (Value::BigDecimal(d), _) => Json::String(d.to_string()),
            (Value::Decimal(d), Schema::Decimal(decimal)) => {
                let scaled = BigDecimal::new(d.clone().into(), decimal.scale as i64);
                Json::String(scaled.to_string())
            }
            (Value::Duration(d), _) => serde_json::json!({
                "months": u32::from(d.months()),
                "days": u32::from(d.days()),
                "millis": u32::from(d.millis()),
            }),
            (Value::Union(idx, inner), Schema::Union(union)) => {
                let variant = union
                    .variants()
                    .get(*idx as usize)
                    .ok_or_else(|| CodecError::malformed(format!("avro: union branch {idx} out of range")))?;
                self.to_json(inner, variant)?
            }
            (Value::Array(items), Schema::Array(array)) => Json::Array(
                items
                    .iter()
                    .map(|item| self.to_json(item, &array.items))
                    .collect::<Result<_, _>>()?,
            ),
            (Value::Map(entries), Schema::Map(map)) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.to_json(v, &map.types)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
            (Value::Record(fields), Schema::Record(record)) => {
                let mut object = serde_json::Map::with_capacity(fields.len());
                for (name, v) in fields {
                    let field = record
                        .lookup
                        .get(name)
                        .and_then(|idx| record.fields.get(*idx))
                        .ok_or_else(|| CodecError::malformed(format!("avro: field '{name}' not in schema")))?;
                    object.insert(name.clone(), self.to_json(v, &field.schema)?);
                }
                Json::Object(object)
            }
            (value, schema) => {
                return Err(CodecError::malformed(format!(
                    "avro: datum {value:?} does not match schema {}",
                    schema.canonical_form()
                )));
            }
        };
        Ok(json)
    }

    /// JSON → datum. Несовпадение типа с полем схемы → ошибка, а не молчаливый Null.
    fn from_json(&self, val: &Json, schema: &'s Schema) -> Result<Value, CodecError> {
        let schema = self.resolve(schema)?;
        match (val, schema) {
            (Json::Null, Schema::Null) => Ok(Value::Null),
            (Json::Bool(b), Schema::Boolean) => Ok(Value::Boolean(*b)),
            (Json::Number(_), Schema::Int) => int(val).map(Value::Int),
            (Json::Number(_), Schema::Date) => int(val).map(Value::Date),
            (Json::Number(_), Schema::TimeMillis) => int(val).map(Value::TimeMillis),
            (Json::Number(_), Schema::Long) => long(val).map(Value::Long),
            (Json::Number(_), Schema::TimeMicros) => long(val).map(Value::TimeMicros),
            (Json::Number(_), Schema::TimestampMillis) => long(val).map(Value::TimestampMillis),
            (Json::Number(_), Schema::TimestampMicros) => long(val).map(Value::TimestampMicros),
            (Json::Number(_), Schema::TimestampNanos) => long(val).map(Value::TimestampNanos),
            (Json::Number(_), Schema::LocalTimestampMillis) => long(val).map(Value::LocalTimestampMillis),
            (Json::Number(_), Schema::LocalTimestampMicros) => long(val).map(Value::LocalTimestampMicros),
            (Json::Number(_), Schema::LocalTimestampNanos) => long(val).map(Value::LocalTimestampNanos),
            (Json::Number(n), Schema::Float) => n
                .as_f64()
                .map(|f| Value::Float(f as f32))
                .ok_or_else(|| mismatch(val, "float")),
            (Json::Number(n), Schema::Double) => n.as_f64().map(Value::Double).ok_or_else(|| mismatch(val, "double")),
            (Json::String(s), Schema::String) => Ok(Value::String(s.clone())),
            (Json::String(s), Schema::Uuid) => Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|_| mismatch(val, "uuid")),
            (Json::String(s), Schema::Enum(enum_schema)) => enum_schema
                .symbols
                .iter()
                .position(|symbol| symbol == s)
                .map(|idx| Value::Enum(idx as u32, s.clone()))
                .ok_or_else(|| mismatch(val, "enum symbol")),
            (Json::String(s), Schema::Bytes) => B64
                .decode(s)
                .map(Value::Bytes)
                .map_err(|_| mismatch(val, "base64 bytes")),
            (Json::String(s), Schema::Fixed(fixed)) => match B64.decode(s) {
                Ok(bytes) if bytes.len() == fixed.size => Ok(Value::Fixed(fixed.size, bytes)),
                _ => Err(mismatch(val, &format!("base64 of {} bytes", fixed.size))),
            },
            (Json::String(_) | Json::Number(_), Schema::Decimal(decimal)) => decimal_value(val, decimal),
            (Json::String(_) | Json::Number(_), Schema::BigDecimal) => big_decimal(val).map(Value::BigDecimal),
            (Json::Object(map), Schema::Duration) => {
                let part = |key: &str| {
                    map.get(key)
                        .and_then(Json::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| mismatch(val, "duration {months, days, millis}"))
                };
                Ok(Value::Duration(Duration::new(
                    Months::new(part("months")?),
                    Days::new(part("days")?),
                    Millis::new(part("millis")?),
                )))
            }
            (Json::Array(items), Schema::Array(inner)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.from_json(item, &inner.items))
                    .collect::<Result<_, _>>()?,
            )),
            (Json::Object(map), Schema::Map(inner)) => {
                let mut entries = std::collections::HashMap::with_capacity(map.len());
                for (k, v) in map {
                    entries.insert(k.clone(), self.from_json(v, &inner.types)?);
                }
                Ok(Value::Map(entries))
            }
            (Json::Object(map), Schema::Record(record_schema)) => {
                let mut fields = Vec::with_capacity(record_schema.fields.len());
                for field in &record_schema.fields {
                    let field_val = map
                        .get(&field.name)
                        .or(field.default.as_ref())
                        .unwrap_or(&Json::Null);
                    fields.push((field.name.clone(), self.from_json(field_val, &field.schema)?));
                }
                Ok(Value::Record(fields))
            }
            (val, Schema::Union(union_schema)) => {
                for (idx, variant) in union_schema.variants().iter().enumerate() {
                    if let Ok(v) = self.from_json(val, variant) {
                        return Ok(Value::Union(idx as u32, Box::new(v)));
                    }
                }
                Err(CodecError::malformed(format!("avro: cannot convert {val} to union")))
            }
            (val, schema) => Err(CodecError::malformed(format!(
                "avro: value {val} does not conform to schema {}",
                schema.canonical_form()
            ))),
        }
    }
}

fn int(val: &Json) -> Result<i32, CodecError> {
    val.as_i64()
        .and_then(|i| i32::try_from(i).ok())
        .ok_or_else(|| mismatch(val, "int"))
}

fn long(val: &Json) -> Result<i64, CodecError> {
    val.as_i64().ok_or_else(|| mismatch(val, "long"))
}

/// Decimal принимается строкой (`"12.34"`) или числом; дробная часть
/// не длиннее scale, цифр не больше precision.
fn decimal_value(val: &Json, decimal: &DecimalSchema) -> Result<Value, CodecError> {
    let parsed = big_decimal(val)?;
    let scaled = parsed.with_scale(decimal.scale as i64);
    if scaled != parsed || scaled.digits() > decimal.precision as u64 {
        return Err(mismatch(
            val,
            &format!("decimal({}, {})", decimal.precision, decimal.scale),
        ));
    }
    let (unscaled, _) = scaled.as_bigint_and_exponent();
    let bytes = unscaled.to_signed_bytes_be();
    if let Schema::Fixed(fixed) = decimal.inner.as_ref() {
        if bytes.len() > fixed.size {
            return Err(mismatch(val, &format!("decimal fitting {} bytes", fixed.size)));
        }
    }
    Ok(Value::Decimal(Decimal::from(bytes)))
}

fn big_decimal(val: &Json) -> Result<BigDecimal, CodecError> {
    let text = match val {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.parse::<BigDecimal>().map_err(|_| mismatch(val, "decimal"))
}

fn mismatch(val: &Json, expected: &str) -> CodecError {
    CodecError::malformed(format!("avro: expected {expected}, got {val}"))
}
