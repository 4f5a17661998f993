/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use thiserror::Error;

use crate::types::{MetricType, SampleMods, Value};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsdParseError {
    #[error("no key field")]
    NoKey,
    #[error("invalid key field")]
    InvalidKey,
    #[error("no value field")]
    NoValue,
    #[error("invalid value field")]
    InvalidValue,
    #[error("no type field")]
    NoType,
    #[error("unsupported type")]
    UnsupportedType,
    #[error("invalid sample rate field")]
    InvalidSampleRate,
}

/// One well-formed statsd sample, borrowing the datagram buffer.
#[derive(Debug)]
pub struct ParsedSample<'a> {
    /// full metric key, tag text included
    pub key: &'a str,
    pub value: Value,
    pub r#type: MetricType,
    pub sample_rate: Value,
    pub mods: SampleMods,
}

/// Iterator over the samples of one datagram, `key:value|type[|@rate]` per
/// line. Malformed lines yield an error and parsing continues with the next
/// line.
pub struct StatsdRecordVisitor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> StatsdRecordVisitor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        StatsdRecordVisitor { buf, offset: 0 }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.offset >= self.buf.len() {
            return None;
        }

        let left = &self.buf[self.offset..];
        match memchr::memchr(b'\n', left) {
            Some(p) => {
                self.offset += p + 1;
                Some(&left[..p])
            }
            None => {
                self.offset = self.buf.len();
                Some(left)
            }
        }
    }
}

impl<'a> Iterator for StatsdRecordVisitor<'a> {
    type Item = Result<ParsedSample<'a>, StatsdParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?;
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line));
        }
    }
}

fn parse_line(line: &[u8]) -> Result<ParsedSample<'_>, StatsdParseError> {
    let colon = memchr::memchr(b':', line).ok_or(StatsdParseError::NoValue)?;
    if colon == 0 {
        return Err(StatsdParseError::NoKey);
    }
    let key = std::str::from_utf8(&line[..colon]).map_err(|_| StatsdParseError::InvalidKey)?;

    let left = &line[colon + 1..];
    let pipe = memchr::memchr(b'|', left).ok_or(StatsdParseError::NoType)?;
    let value_field = &left[..pipe];
    if value_field.is_empty() {
        return Err(StatsdParseError::NoValue);
    }

    // a signed gauge value adjusts the current value instead of replacing it
    let mods = SampleMods {
        relative: matches!(value_field[0], b'+' | b'-'),
    };
    let value_str =
        std::str::from_utf8(value_field).map_err(|_| StatsdParseError::InvalidValue)?;
    let value = Value::from_str(value_str).map_err(|_| StatsdParseError::InvalidValue)?;

    let left = &left[pipe + 1..];
    let (type_field, rate_field) = match memchr::memchr(b'|', left) {
        Some(p) => (&left[..p], Some(&left[p + 1..])),
        None => (left, None),
    };
    let r#type = MetricType::from_statsd(type_field).ok_or(StatsdParseError::UnsupportedType)?;

    let mut sample_rate = 1.0;
    if let Some(field) = rate_field {
        let Some(rate_str) = field.strip_prefix(b"@") else {
            return Err(StatsdParseError::InvalidSampleRate);
        };
        let rate_str =
            std::str::from_utf8(rate_str).map_err(|_| StatsdParseError::InvalidSampleRate)?;
        let rate =
            Value::from_str(rate_str).map_err(|_| StatsdParseError::InvalidSampleRate)?;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(StatsdParseError::InvalidSampleRate);
        }
        sample_rate = rate;
    }

    Ok(ParsedSample {
        key,
        value,
        r#type,
        sample_rate,
        mods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etsy_statsd() {
        let buf = b"gorets:1|c\n\ngaugor:333|g\n";

        let mut iter = StatsdRecordVisitor::new(buf);
        let r1 = iter.next().unwrap().unwrap();
        assert_eq!(r1.key, "gorets");
        assert_eq!(r1.r#type, MetricType::Meter);
        assert_eq!(r1.value, 1.0);
        assert_eq!(r1.sample_rate, 1.0);
        assert!(!r1.mods.relative);

        let r2 = iter.next().unwrap().unwrap();
        assert_eq!(r2.key, "gaugor");
        assert_eq!(r2.r#type, MetricType::Gauge);
        assert_eq!(r2.value, 333.0);

        assert!(iter.next().is_none());
    }

    #[test]
    fn tagged_key_passes_through() {
        let buf = b"api.reqs,host=a,dc=e:1|c";
        let r = StatsdRecordVisitor::new(buf).next().unwrap().unwrap();
        assert_eq!(r.key, "api.reqs,host=a,dc=e");
        assert_eq!(r.r#type, MetricType::Meter);
    }

    #[test]
    fn timer_with_sample_rate() {
        let buf = b"glork:320|ms|@0.1";
        let r = StatsdRecordVisitor::new(buf).next().unwrap().unwrap();
        assert_eq!(r.r#type, MetricType::Timer);
        assert_eq!(r.value, 320.0);
        assert_eq!(r.sample_rate, 0.1);
    }

    #[test]
    fn relative_gauge_values() {
        let mut iter = StatsdRecordVisitor::new(b"gaugor:+10|g\ngaugor:-4|g");
        let r1 = iter.next().unwrap().unwrap();
        assert!(r1.mods.relative);
        assert_eq!(r1.value, 10.0);

        let r2 = iter.next().unwrap().unwrap();
        assert!(r2.mods.relative);
        assert_eq!(r2.value, -4.0);
    }

    #[test]
    fn raw_counter_type() {
        let r = StatsdRecordVisitor::new(b"bytes.total:1234|C")
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(r.r#type, MetricType::Counter);
    }

    #[test]
    fn malformed_lines_keep_parsing() {
        let buf = b"no-value\n:1|c\nx:|c\nx:abc|c\nx:1|zz\nx:1|c|@abc\nx:1|c|@2\nok:1|c";
        let mut iter = StatsdRecordVisitor::new(buf);
        assert_eq!(iter.next().unwrap().unwrap_err(), StatsdParseError::NoValue);
        assert_eq!(iter.next().unwrap().unwrap_err(), StatsdParseError::NoKey);
        assert_eq!(iter.next().unwrap().unwrap_err(), StatsdParseError::NoValue);
        assert_eq!(
            iter.next().unwrap().unwrap_err(),
            StatsdParseError::InvalidValue
        );
        assert_eq!(
            iter.next().unwrap().unwrap_err(),
            StatsdParseError::UnsupportedType
        );
        assert_eq!(
            iter.next().unwrap().unwrap_err(),
            StatsdParseError::InvalidSampleRate
        );
        assert_eq!(
            iter.next().unwrap().unwrap_err(),
            StatsdParseError::InvalidSampleRate
        );

        let ok = iter.next().unwrap().unwrap();
        assert_eq!(ok.key, "ok");
        assert!(iter.next().is_none());
    }
}
