use std::ffi::{c_void, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// Receives validation-layer messages for the lifetime of a `DeviceContext`
pub type DebugCallback = Box<dyn Fn(vk::DebugUtilsMessageSeverityFlagsEXT, &str) + Send + Sync>;

/// Default callback, forwards everything to the `log` facade
pub fn log_debug_message(severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::trace!("[Verbose] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Info] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Warning] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Error] {}", message),
        _ => log::warn!("[Unknown] {}", message),
    }
}

/// Unregisters itself on drop. Holds a reference to the callback so the
/// pointer handed to the driver outlives the registration.
pub(crate) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    _callback: Arc<DebugCallback>,
}

impl DebugMessenger {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        callback: Arc<DebugCallback>,
    ) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_debug_message))
            .user_data(Arc::as_ptr(&callback) as *mut c_void);
        let messenger = unsafe { loader.create_debug_utils_messenger(&info, None)? };

        Ok(Self { loader, messenger, _callback: callback })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn forward_debug_message(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_user_data.is_null() || p_callback_data.is_null() {
        return vk::FALSE;
    }

    let (callback, message) = unsafe {
        let callback = &*(p_user_data as *const DebugCallback);
        let p_message = (*p_callback_data).p_message;
        if p_message.is_null() {
            return vk::FALSE;
        }
        (callback, CStr::from_ptr(p_message).to_string_lossy())
    };
    callback(message_severity, &message);

    vk::FALSE
}
