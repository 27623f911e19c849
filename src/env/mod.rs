//! # Environment client
//!
//! Typed access to a remote Gym-compatible environment server.
//!
//! - [`Space`] describes action and observation spaces and their tensor shapes
//! - [`Env`] is one environment instance: reset, step, render, results, videos
//! - [`Normalizer`] implementations transform observations before agents see them
//! - [`EnvTransport`] abstracts the RPC; [`HttpTransport`] speaks JSON over HTTP
//! - [`Server`] connects to, or launches, a local server
//!
//! ```rust,no_run
//! use gymkit::env::{EnvOpts, EqWidthBinNormalizer, Server};
//!
//! # fn main() -> gymkit::error::Result<()> {
//! let server = Server::connect("http://localhost:50051")?;
//! let mut env = server.make(
//!     "CartPole-v0",
//!     EnvOpts::default().normalizer(
//!         EqWidthBinNormalizer::new(vec![1, 1, 6, 12])
//!             .with_bounds(vec![-4.8, -10.0, -0.25, -3.5], vec![4.8, 10.0, 0.25, 3.5]),
//!     ),
//! )?;
//! let first = env.reset()?;
//! let outcome = env.step(0)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod normalizer;
pub mod server;
pub mod space;
pub mod transport;

pub use client::{Env, EnvOpts, EnvResults, InitialObservation, Outcome};
pub use normalizer::{
    EqWidthBinNormalizer, ExpandDimsNormalizer, MinMaxNormalizer, Normalizer, ReshapeNormalizer,
};
pub use server::{Server, ServerConfig};
pub use space::{BoxSpace, Space};
pub use transport::{EnvTransport, HttpTransport, Wrapper};
