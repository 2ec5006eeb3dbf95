// Jackson Coxson

#[cfg(feature = "afc")]
pub mod afc;
#[cfg(feature = "crashreportcopymobile")]
pub mod crashreportcopymobile;
#[cfg(feature = "diagnostics_relay")]
pub mod diagnostics_relay;
pub mod lockdown;
#[cfg(feature = "mobile_image_mounter")]
pub mod mobile_image_mounter;
#[cfg(feature = "syslog_relay")]
pub mod syslog_relay;
#[cfg(feature = "webinspector")]
pub mod webinspector;
