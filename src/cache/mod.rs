pub mod climate_cache;
