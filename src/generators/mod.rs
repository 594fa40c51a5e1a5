// Pure factories for the records simulators emit: entity updates, captured
// images, and the randomized delays that pace them. No I/O here.

pub mod entity_updates;
pub mod images;
pub mod timing;


pub use entity_updates::{
    cc_machine_update, ccs_ext_module_update, evaporator_update, pcc_left_chute_update,
    pcc_right_chute_update, robot_update, round_bottom_flask_update, sample_cartridge_update,
    silica_cartridge_update, tube_rack_update, wire_timestamp,
};
pub use images::{captured_images, image_url};
pub use timing::{cc_duration, evaporation_duration, intermediate_interval, scaled_delay};
