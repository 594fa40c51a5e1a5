//! Fabricated image URLs and capture records.
//!
//! The mock never talks to an object store; the contract is only the URL
//! shape `{base}/{workstation}/{device_id}/{component}/{timestamp}.jpg`.

use crate::protocol::CapturedImage;

use super::entity_updates::wire_timestamp;

pub fn image_url(base_url: &str, work_station: &str, device_id: &str, component: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}.jpg",
        base_url,
        work_station,
        device_id,
        component,
        wire_timestamp()
    )
}

/// One [`CapturedImage`] per component.
pub fn captured_images(
    base_url: &str,
    work_station: &str,
    device_id: &str,
    device_type: &str,
    components: &[String],
) -> Vec<CapturedImage> {
    components
        .iter()
        .map(|component| CapturedImage {
            work_station: work_station.to_string(),
            device_id: device_id.to_string(),
            device_type: device_type.to_string(),
            component: component.clone(),
            url: image_url(base_url, work_station, device_id, component),
            create_time: wire_timestamp(),
        })
        .collect()
}
