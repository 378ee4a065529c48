//! Stream filters
//!
//! Content streams are decoded before the watermark engine inspects them and
//! re-encoded before they are written back. Only the filters needed for page
//! content are supported: LZWDecode (weezl) and FlateDecode (flate2).

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Object, Stream};
use weezl::BitOrder;
use crate::error::{Error, Result};
use crate::object::integer;

/// Decode parameters recognized by the filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    /// LZW code width switches one code early (PDF default)
    pub early_change: bool,
    /// Only 1 (no predictor) is supported
    pub predictor: i64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            early_change: true,
            predictor: 1,
        }
    }
}

impl FilterParams {
    /// Read parameters from a `/DecodeParms` dictionary, falling back to defaults
    pub fn from_dict(dict: Option<&Dictionary>) -> Self {
        let mut params = Self::default();
        if let Some(dict) = dict {
            if let Some(ec) = dict.get(b"EarlyChange").ok().and_then(integer) {
                params.early_change = ec != 0;
            }
            if let Some(p) = dict.get(b"Predictor").ok().and_then(integer) {
                params.predictor = p;
            }
        }
        params
    }

    fn check_predictor(&self) -> Result<()> {
        if self.predictor > 1 {
            return Err(Error::UnsupportedPredictor(self.predictor));
        }
        Ok(())
    }
}

/// A pluggable stream codec
pub trait StreamFilter {
    fn encode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>>;
}

/// LZWDecode, MSB first with 8 bit symbols
pub struct LzwFilter;

impl StreamFilter for LzwFilter {
    fn encode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
        params.check_predictor()?;
        let mut encoder = if params.early_change {
            weezl::encode::Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            weezl::encode::Encoder::new(BitOrder::Msb, 8)
        };
        encoder.encode(data).map_err(|e| Error::Filter(format!("LZW encode: {}", e)))
    }

    fn decode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
        params.check_predictor()?;
        let mut decoder = if params.early_change {
            weezl::decode::Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            weezl::decode::Decoder::new(BitOrder::Msb, 8)
        };
        decoder.decode(data).map_err(|e| Error::Filter(format!("LZW decode: {}", e)))
    }
}

/// FlateDecode (zlib)
pub struct FlateFilter;

impl StreamFilter for FlateFilter {
    fn encode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
        params.check_predictor()?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
        params.check_predictor()?;
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Filter(format!("Flate decode: {}", e)))?;
        Ok(out)
    }
}

/// Look up the codec for a filter name
pub fn filter_for(name: &[u8]) -> Result<Box<dyn StreamFilter>> {
    match name {
        b"LZWDecode" | b"LZW" => Ok(Box::new(LzwFilter)),
        b"FlateDecode" | b"Fl" => Ok(Box::new(FlateFilter)),
        other => Err(Error::UnsupportedFilter(String::from_utf8_lossy(other).into_owned())),
    }
}

/// True for errors the watermark engine downgrades to "skip this stream"
pub fn is_unsupported(err: &Error) -> bool {
    matches!(err, Error::UnsupportedFilter(_) | Error::UnsupportedPredictor(_))
}

/// The stream's filter pipeline paired with the decode parameters of each stage
fn pipeline(stream: &Stream) -> Result<Vec<(Vec<u8>, FilterParams)>> {
    let names: Vec<Vec<u8>> = match stream.dict.get(b"Filter") {
        Err(_) | Ok(Object::Null) => return Ok(Vec::new()),
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .map(|o| match o {
                Object::Name(n) => Ok(n.clone()),
                _ => Err(Error::UnsupportedFilter("non-name filter entry".to_string())),
            })
            .collect::<Result<_>>()?,
        Ok(_) => return Err(Error::UnsupportedFilter("indirect filter".to_string())),
    };

    let parms: Vec<Option<&Dictionary>> = match stream.dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(d)) => vec![Some(d)],
        Ok(Object::Array(arr)) => arr
            .iter()
            .map(|o| match o {
                Object::Dictionary(d) => Some(d),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, FilterParams::from_dict(parms.get(i).copied().flatten())))
        .collect())
}

/// Decoded content bytes of a stream, running its filters in order
pub fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    let mut data = stream.content.clone();
    for (name, params) in pipeline(stream)? {
        data = filter_for(&name)?.decode(&data, &params)?;
    }
    Ok(data)
}

/// Replace a stream's content with `data`, encoded through its filters in reverse order
pub fn encode_stream(stream: &mut Stream, data: Vec<u8>) -> Result<()> {
    let mut data = data;
    for (name, params) in pipeline(stream)?.into_iter().rev() {
        data = filter_for(&name)?.encode(&data, &params)?;
    }
    stream.dict.set("Length", Object::Integer(data.len() as i64));
    stream.content = data;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(filter: &str, content: Vec<u8>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        Stream::new(dict, content)
    }

    #[test]
    fn test_unfiltered_stream_passthrough() {
        let stream = Stream::new(Dictionary::new(), b"0 0 m 10 10 l S".to_vec());
        assert_eq!(decode_stream(&stream).unwrap(), b"0 0 m 10 10 l S");
    }

    #[test]
    fn test_flate_encode_decode() {
        let mut stream = stream_with("FlateDecode", Vec::new());
        encode_stream(&mut stream, b"BT /F1 12 Tf (Hello) Tj ET".to_vec()).unwrap();
        assert_ne!(stream.content, b"BT /F1 12 Tf (Hello) Tj ET");
        assert_eq!(decode_stream(&stream).unwrap(), b"BT /F1 12 Tf (Hello) Tj ET");
    }

    #[test]
    fn test_lzw_early_change_variants() {
        let text = b"q 1 0 0 1 0 0 cm q 1 0 0 1 0 0 cm q 1 0 0 1 0 0 cm Q Q Q".repeat(20);
        for early_change in [true, false] {
            let params = FilterParams { early_change, predictor: 1 };
            let encoded = LzwFilter.encode(&text, &params).unwrap();
            assert_eq!(LzwFilter.decode(&encoded, &params).unwrap(), text);
        }
    }

    #[test]
    fn test_decode_parms_early_change_zero() {
        let mut parms = Dictionary::new();
        parms.set("EarlyChange", Object::Integer(0));
        let params = FilterParams::from_dict(Some(&parms));
        assert!(!params.early_change);
        assert_eq!(params.predictor, 1);
        assert!(FilterParams::from_dict(None).early_change);
    }

    #[test]
    fn test_predictor_unsupported() {
        let params = FilterParams { early_change: true, predictor: 12 };
        let err = LzwFilter.decode(b"", &params).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPredictor(12)));
        assert!(is_unsupported(&err));
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let stream = stream_with("DCTDecode", vec![0xFF, 0xD8]);
        let err = decode_stream(&stream).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilter(ref n) if n == "DCTDecode"));
    }
}
