//! Configuration types and loading for the data optimizer service.
//!
//! Settings are read from `configuration/base.yaml` and `configuration/{environment}.yaml` and
//! then overridden by `APP_`-prefixed environment variables. See [`load::load_config`].

pub mod environment;
pub mod load;
pub mod shared;
