//! Service identification for open ports

pub mod service_detection;

pub use service_detection::{
    identify_services, match_banner, signatures, BannerGrabber, ServiceIdentifier,
    ServiceIdentity, ServiceSignature,
};
