pub(crate) mod engine;
pub(crate) mod register_file;
pub(crate) mod reservation_station;
