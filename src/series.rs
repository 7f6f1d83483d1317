use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tian::CorrectionResult;
use crate::{Error, Result};

/// A heat-flow measurement
///
/// Samples are `(time_s, heat_flow_w_g)` pairs: time in seconds and heat flow in watt per gram of
/// sample. The time axis is finite and strictly increasing, though not necessarily evenly spaced;
/// gaps where the instrument dropped samples are fine. Every heat-flow value is finite.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    time_s: Vec<f64>,
    heat_flow_w_g: Vec<f64>,
}

impl TimeSeries {
    /// Build a series from separate time and heat-flow columns
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] naming the first offending sample if the columns differ in
    /// length, a value is `NaN` or infinite, or a time stamp does not exceed its predecessor.
    pub fn new(time_s: Vec<f64>, heat_flow_w_g: Vec<f64>) -> Result<Self> {
        if time_s.len() != heat_flow_w_g.len() {
            let index = time_s.len().min(heat_flow_w_g.len());
            return Err(Error::InvalidInput {
                index,
                time: time_s.get(index).copied().unwrap_or(f64::NAN),
                reason: format!(
                    "time column has {} samples but heat flow column has {}",
                    time_s.len(),
                    heat_flow_w_g.len()
                ),
            });
        }

        for (index, (&time, &heat_flow)) in time_s.iter().zip(&heat_flow_w_g).enumerate() {
            if !time.is_finite() {
                return Err(Error::InvalidInput {
                    index,
                    time,
                    reason: "time stamp is not finite".into(),
                });
            }
            if !heat_flow.is_finite() {
                return Err(Error::InvalidInput {
                    index,
                    time,
                    reason: format!("heat flow {heat_flow} is not finite"),
                });
            }
            if index > 0 && time <= time_s[index - 1] {
                return Err(Error::InvalidInput {
                    index,
                    time,
                    reason: format!(
                        "time stamps must be strictly increasing, previous was {}",
                        time_s[index - 1]
                    ),
                });
            }
        }

        Ok(Self {
            time_s,
            heat_flow_w_g,
        })
    }

    /// Build a series from `(time_s, heat_flow_w_g)` pairs
    ///
    /// # Errors
    /// See [`TimeSeries::new`].
    pub fn from_samples(samples: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let (time_s, heat_flow_w_g) = samples.into_iter().unzip();
        Self::new(time_s, heat_flow_w_g)
    }

    /// Read the normalized two column format
    ///
    /// The file is a CSV document with a `time_s,heat_flow_w_g` header. Instrument specific
    /// exports must be converted to this layout beforehand.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a row does not parse as two floats, or the
    /// samples do not form a valid series.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = fs::read(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(&file[..]);

        let mut samples = vec![];
        for result in rdr.deserialize() {
            let row: SampleRow = result?;
            samples.push((row.time_s, row.heat_flow_w_g));
        }
        Self::from_samples(samples)
    }

    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_s.is_empty()
    }

    pub fn time_s(&self) -> &[f64] {
        &self.time_s
    }

    pub fn heat_flow_w_g(&self) -> &[f64] {
        &self.heat_flow_w_g
    }

    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time_s
            .iter()
            .copied()
            .zip(self.heat_flow_w_g.iter().copied())
    }

    /// Keep only the samples at `indices`
    ///
    /// # Panics
    /// If an index is out of bounds or `indices` is not strictly increasing.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        assert!(
            indices.windows(2).all(|pair| pair[0] < pair[1]),
            "selected indices must be strictly increasing"
        );
        Self {
            time_s: indices.iter().map(|&ii| self.time_s[ii]).collect(),
            heat_flow_w_g: indices.iter().map(|&ii| self.heat_flow_w_g[ii]).collect(),
        }
    }

    /// Split the series into samples before `time_s` and samples at or after it
    #[must_use]
    pub fn split_at_time(&self, time_s: f64) -> (Self, Self) {
        let split = self.time_s.partition_point(|&t| t < time_s);
        (
            Self {
                time_s: self.time_s[..split].to_vec(),
                heat_flow_w_g: self.heat_flow_w_g[..split].to_vec(),
            },
            Self {
                time_s: self.time_s[split..].to_vec(),
                heat_flow_w_g: self.heat_flow_w_g[split..].to_vec(),
            },
        )
    }

    /// Join two series where every time stamp of `later` follows those of `self`
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if the series overlap in time.
    pub fn concat(mut self, later: Self) -> Result<Self> {
        if let (Some(&last), Some(&first)) = (self.time_s.last(), later.time_s.first()) {
            if first <= last {
                return Err(Error::InvalidInput {
                    index: self.len(),
                    time: first,
                    reason: format!("appended series starts before {last}"),
                });
            }
        }
        self.time_s.extend(later.time_s);
        self.heat_flow_w_g.extend(later.heat_flow_w_g);
        Ok(self)
    }
}

#[derive(Deserialize)]
struct SampleRow {
    time_s: f64,
    heat_flow_w_g: f64,
}

#[derive(Serialize)]
struct AugmentedRow {
    time_s: f64,
    heat_flow_w_g: f64,
    heat_flow_w_g_tian: f64,
}

/// Write the series together with its corrected heat flow
///
/// Rows carry `time_s,heat_flow_w_g,heat_flow_w_g_tian`, aligned by index.
///
/// # Errors
/// Returns an error if the file cannot be written, or [`Error::InvalidInput`] if `result` was
/// computed for a series of a different length.
pub fn write_augmented_csv(
    path: &Path,
    series: &TimeSeries,
    result: &CorrectionResult,
) -> Result<()> {
    if result.q_tian().len() != series.len() {
        let index = result.q_tian().len().min(series.len());
        return Err(Error::InvalidInput {
            index,
            time: series.time_s().get(index).copied().unwrap_or(f64::NAN),
            reason: format!(
                "correction has {} samples but series has {}",
                result.q_tian().len(),
                series.len()
            ),
        });
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for ((time_s, heat_flow_w_g), &heat_flow_w_g_tian) in series.samples().zip(result.q_tian()) {
        wtr.serialize(AugmentedRow {
            time_s,
            heat_flow_w_g,
            heat_flow_w_g_tian,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
