pub mod broadcast_settings;
pub mod delivery_job;
pub mod phone_number;
pub mod status_notification;
pub mod subscriber;
