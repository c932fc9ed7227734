use super::value::Value;
use super::wire;
use super::DecodingError;

/// Decodes Boss-encoded bytes into `Value`s, mirroring `Encoder`'s
/// back-reference cache so that references written during tree-mode
/// encoding resolve to the correct previously-decoded value.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    cache: Vec<Value>,
    tree_mode: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            cache: Vec::new(),
            tree_mode: true,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_value(&mut self) -> Result<Value, DecodingError> {
        let (code, value) = self.read_header()?;
        self.read_with_header(code, value)
    }

    fn read_with_header(&mut self, code: u8, value: u64) -> Result<Value, DecodingError> {
        match code {
            wire::TYPE_INT => Ok(Value::Int(value as i64)),
            wire::TYPE_NINT => Ok(Value::Int(-(value as i64))),
            wire::TYPE_EXTRA => self.read_extra(value as u8),
            wire::TYPE_TEXT => {
                let bytes = self.read_n(value as usize)?;
                let s = String::from_utf8(bytes).map_err(|_| DecodingError::InvalidUtf8)?;
                let val = Value::String(s);
                if !val_is_empty_stringish(&val) {
                    self.cache_push(val.clone());
                }
                Ok(val)
            }
            wire::TYPE_BIN => {
                let bytes = self.read_n(value as usize)?;
                let is_empty = bytes.is_empty();
                let val = Value::Bytes(bytes);
                if !is_empty {
                    self.cache_push(val.clone());
                }
                Ok(val)
            }
            wire::TYPE_CREF => {
                let idx = value as usize;
                self.cache
                    .get(idx)
                    .cloned()
                    .ok_or(DecodingError::BadReference(idx))
            }
            wire::TYPE_LIST => {
                let n = value as usize;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.read_value()?);
                }
                let val = Value::Array(items);
                self.cache_push(val.clone());
                Ok(val)
            }
            wire::TYPE_DICT => {
                let n = value as usize;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    let key = self.read_value()?;
                    let key = key.as_str().map(str::to_string).ok_or(DecodingError::NonStringKey)?;
                    let val = self.read_value()?;
                    entries.push((key, val));
                }
                let val = Value::Mapping(entries);
                self.cache_push(val.clone());
                Ok(val)
            }
            other => Err(DecodingError::UnknownTypeCode(other)),
        }
    }

    fn read_extra(&mut self, sub: u8) -> Result<Value, DecodingError> {
        match sub {
            wire::XT_DZERO => Ok(Value::Double(0.0)),
            wire::XT_DONE => Ok(Value::Double(1.0)),
            wire::XT_DMINUSONE => Ok(Value::Double(-1.0)),
            wire::XT_DOUBLE => {
                let bytes = self.read_n(8)?;
                let arr: [u8; 8] = bytes.try_into().map_err(|_| DecodingError::UnexpectedEof)?;
                Ok(Value::Double(f64::from_le_bytes(arr)))
            }
            wire::XT_TTRUE => Ok(Value::Bool(true)),
            wire::XT_FALSE => Ok(Value::Bool(false)),
            wire::XT_TIME => {
                let (_, value) = self.read_header()?;
                Ok(Value::Time(value))
            }
            wire::XT_STREAM_MODE => {
                self.tree_mode = false;
                self.read_value()
            }
            other => Err(DecodingError::UnknownExtraCode(other)),
        }
    }

    fn cache_push(&mut self, value: Value) {
        if self.tree_mode {
            self.cache.push(value);
        }
    }

    fn read_header(&mut self) -> Result<(u8, u64), DecodingError> {
        let b = self.read_byte()?;
        let code = b & 0x07;
        let high = (b >> 3) & 0x1f;
        if high <= 22 {
            return Ok((code, high as u64));
        }
        let n = (high - 23 + 1) as usize;
        let bytes = self.read_n(n)?;
        let mut arr = [0u8; 8];
        arr[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
        Ok((code, u64::from_le_bytes(arr)))
    }

    fn read_byte(&mut self) -> Result<u8, DecodingError> {
        let b = *self.data.get(self.pos).ok_or(DecodingError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_n(&mut self, n: usize) -> Result<Vec<u8>, DecodingError> {
        if self.pos + n > self.data.len() {
            return Err(DecodingError::UnexpectedEof);
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }
}

fn val_is_empty_stringish(v: &Value) -> bool {
    matches!(v, Value::String(s) if s.is_empty())
}
