//! Reader for ECB responses in the SDMX-ML 2.1 "generic" data format.
//!
//! A response holds one `Series` per requested key. Each series carries its
//! key and attributes as `Value` elements followed by `Obs` elements, each of
//! which holds an `ObsDimension` (the date) and an `ObsValue` (the rate).
//!
//! The format has no key joining a `Value` to an `Obs`, so observations are
//! paired with the series' `Value` elements by position, and a series only
//! yields as many observations as it has values.

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::currency_pair::CurrencyPair;
use crate::error::SdmxError;
use crate::exchange_rate::ExchangeRate;

pub const GENERIC_NAMESPACE: &str =
    "http://www.sdmx.org/resources/sdmxml/schemas/v2_1/data/generic";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Series {
    /// Every `Value` under the series in document order, including the ones
    /// nested in observation attributes.
    pub values: Vec<SeriesValue>,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesValue {
    pub id: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Observation {
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
}

/// Parses a generic data message into its series.
///
/// A document without a root element, or one that ends while any element is
/// still open, is rejected as [`SdmxError::Truncated`].
pub fn parse_series(xml: &str) -> Result<Vec<Series>, SdmxError> {
    let mut reader = NsReader::from_str(xml);
    let mut state = ParseState::default();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_resolved_event()? {
            (ns, Event::Start(e)) => {
                depth += 1;
                seen_root = true;
                state.open(&ns, &e)?;
            }
            (ns, Event::Empty(e)) => {
                seen_root = true;
                state.open(&ns, &e)?;
                state.close(&ns, e.local_name().as_ref());
            }
            (ns, Event::End(e)) => {
                depth = depth.saturating_sub(1);
                state.close(&ns, e.local_name().as_ref());
            }
            (_, Event::Eof) => {
                if !seen_root || depth > 0 || state.is_open() {
                    return Err(SdmxError::Truncated);
                }
                break;
            }
            _ => {}
        }
    }

    Ok(state.series)
}

/// Extracts every complete observation of `xml` as a rate for `pair`.
///
/// Observations missing a date or a value are skipped, and so are those whose
/// value is exactly zero.
pub fn parse_exchange_rates(
    xml: &str,
    pair: &CurrencyPair,
    source: &str,
) -> Result<Vec<ExchangeRate>, SdmxError> {
    let mut rates = Vec::new();

    for series in parse_series(xml)? {
        for (observation, value) in series.observations.iter().zip(&series.values) {
            log::trace!(
                "{} observation {:?} paired with series value {:?}={:?}",
                pair,
                observation,
                value.id,
                value.value
            );

            match (observation.date, observation.value) {
                (Some(date), Some(rate)) if rate != 0.0 => {
                    rates.push(ExchangeRate::new(date, rate, pair.clone(), source));
                }
                (Some(date), Some(_)) => {
                    log::warn!("Dropping zero {} rate observed on {}", pair, date);
                }
                _ => log::debug!("Skipping incomplete {} observation {:?}", pair, observation),
            }
        }
    }

    Ok(rates)
}

#[derive(Default)]
struct ParseState {
    series: Vec<Series>,
    current: Option<Series>,
    observation: Option<Observation>,
}

impl ParseState {
    fn is_open(&self) -> bool {
        self.current.is_some() || self.observation.is_some()
    }

    fn open(&mut self, ns: &ResolveResult, e: &BytesStart) -> Result<(), SdmxError> {
        let local = e.local_name();
        let local = local.as_ref();

        if is_generic(ns) {
            match local {
                b"Series" => {
                    self.current = Some(Series::default());
                    return Ok(());
                }
                b"Obs" if self.current.is_some() => {
                    self.observation = Some(Observation::default());
                    return Ok(());
                }
                b"Value" => {
                    if let Some(series) = self.current.as_mut() {
                        series.values.push(SeriesValue {
                            id: attribute(e, "id")?,
                            value: attribute(e, "value")?,
                        });
                    }
                }
                _ => {}
            }
        }

        let Some(observation) = self.observation.as_mut() else {
            return Ok(());
        };

        if contains(local, b"ObsDimension") {
            if let Some(value) = attribute(e, "value")? {
                let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .map_err(|source| SdmxError::InvalidDate { value, source })?;
                observation.date = Some(date);
            }
        } else if contains(local, b"ObsValue") {
            if let Some(value) = attribute(e, "value")? {
                let rate = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|source| SdmxError::InvalidRate { value, source })?;
                observation.value = Some(rate);
            }
        }

        Ok(())
    }

    fn close(&mut self, ns: &ResolveResult, local: &[u8]) {
        if !is_generic(ns) {
            return;
        }

        match local {
            b"Obs" => {
                if let (Some(observation), Some(series)) =
                    (self.observation.take(), self.current.as_mut())
                {
                    series.observations.push(observation);
                }
            }
            b"Series" => {
                if let Some(series) = self.current.take() {
                    self.series.push(series);
                }
            }
            _ => {}
        }
    }
}

fn is_generic(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == GENERIC_NAMESPACE.as_bytes())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, SdmxError> {
    let Some(attr) = e
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };

    Ok(Some(attr.unescape_value()?.into_owned()))
}
