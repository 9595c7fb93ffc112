pub mod ssp_controller;
