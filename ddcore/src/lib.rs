pub mod config;
pub mod error;

// data module
pub mod data {
    pub mod droplet;
    pub mod well;
    pub mod cluster;
    pub mod assignment;
    pub mod copy_number;
}

// algorithm module
pub mod algorithm {
    pub mod preprocess;
    pub mod copy_number;
    pub mod statistics;
}
