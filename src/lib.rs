#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

//! Tian correction of isothermal heat-conduction calorimetry data
//!
//! A calorimeter reports the heat flow of a hydrating sample only after it has passed through the
//! instrument's own thermal mass, which delays and broadens the signal. Given the instrument time
//! constants $\tau_1$ and optionally $\tau_2$, the reaction heat flow is recovered as
//! $$
//!     q_{Tian} = q + (\tau_1 + \tau_2) \dot{q} + \tau_1 \tau_2 \ddot{q}.
//! $$
//! Because differentiation amplifies measurement noise, the derivatives are estimated from
//! smoothing spline fits, optionally after a median filter has removed impulsive noise.
//!
//! ```
//! use tian_correction::{correct, ProcessingParameters, TimeSeries};
//!
//! let series = TimeSeries::from_samples(
//!     (0..500).map(|ii| {
//!         let t = 60. * f64::from(ii);
//!         (t, 1e-3 * (-t / 7200.).exp())
//!     }),
//! )?;
//!
//! let mut params = ProcessingParameters::default();
//! params.time_constants.tau1 = Some(240.);
//! params.spline_interpolation.apply = true;
//!
//! let result = correct(&series, &params)?;
//! assert_eq!(result.q_tian().len(), series.len());
//! # Ok::<(), tian_correction::Error>(())
//! ```

pub mod derivative;
pub mod downsample;
pub(crate) mod error;
pub mod filter;
pub mod math;
pub mod params;
pub mod series;
pub mod spline;
pub mod tian;

pub use error::Error;
pub use params::ProcessingParameters;
pub use series::TimeSeries;
pub use tian::{correct, CorrectionResult, TianCorrector};

pub type Result<T> = ::std::result::Result<T, Error>;
