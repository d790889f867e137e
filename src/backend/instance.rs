// Vulkan Instance - loader, instance, validation
//
// Responsibilities:
// - Load the Vulkan library
// - Report supported extensions and available GPUs
// - Instance creation with the toolkit's surface extensions
// - Validation layer check + debug messenger

use anyhow::{bail, Context, Result};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with automatic cleanup
pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub surface_loader: ash::extensions::khr::Surface,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    validation: bool,
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create the instance
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `surface_extensions` - What the windowing toolkit needs to make a surface
    /// * `enable_validation` - Request `VK_LAYER_KHRONOS_validation`; fatal if absent
    pub fn new(
        app_name: &str,
        surface_extensions: &[CString],
        enable_validation: bool,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        log_instance_extensions(&entry)?;

        if enable_validation {
            let available: Vec<String> = entry
                .enumerate_instance_layer_properties()?
                .iter()
                .map(|layer| c_chars_to_string(&layer.layer_name))
                .collect();
            let required = VALIDATION_LAYER.to_string_lossy();
            if !missing_layers(&available, &[required.as_ref()]).is_empty() {
                bail!("Validation layers needed, but not available!");
            }
        }

        let instance = Self::create_instance(&entry, app_name, surface_extensions, enable_validation)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        log_physical_devices(&instance)?;

        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

        Ok(Arc::new(Self {
            instance,
            surface_loader,
            debug_utils,
            validation: enable_validation,
            entry,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        surface_extensions: &[CString],
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions: Vec<*const std::os::raw::c_char> =
            surface_extensions.iter().map(|name| name.as_ptr()).collect();
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create instance!")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// Layers to enable on the logical device as well (ignored by modern loaders)
    pub fn enabled_layers(&self) -> Vec<*const std::os::raw::c_char> {
        if self.validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Names from `required` that are not in `available`
pub fn missing_layers<'a>(available: &[String], required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|name| !available.iter().any(|have| have == name))
        .collect()
}

fn c_chars_to_string(chars: &[std::os::raw::c_char]) -> String {
    unsafe { CStr::from_ptr(chars.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn log_instance_extensions(entry: &Entry) -> Result<()> {
    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .context("Failed to enumerate instance extensions")?;

    log::info!("Supported instance extensions: {}", extensions.len());
    for extension in &extensions {
        log::debug!("\t{}", c_chars_to_string(&extension.extension_name));
    }

    Ok(())
}

fn log_physical_devices(instance: &ash::Instance) -> Result<()> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;

    if devices.is_empty() {
        bail!("Failed to find device with Vulkan support!");
    }

    log::info!("Available physical devices with Vulkan support:");
    for device in devices {
        let props = unsafe { instance.get_physical_device_properties(device) };
        log::info!(
            "\t{} (vendor {:#06x}, {:?}, driver {})",
            c_chars_to_string(&props.device_name),
            props.vendor_id,
            props.device_type,
            props.driver_version,
        );
    }

    Ok(())
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_layer_found_among_others() {
        let available = vec![
            "VK_LAYER_MESA_device_select".to_string(),
            "VK_LAYER_KHRONOS_validation".to_string(),
        ];
        assert!(missing_layers(&available, &["VK_LAYER_KHRONOS_validation"]).is_empty());
    }

    #[test]
    fn reports_only_missing_layers() {
        let available = vec!["VK_LAYER_KHRONOS_validation".to_string()];
        let missing = missing_layers(
            &available,
            &["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_api_dump"],
        );
        assert_eq!(missing, vec!["VK_LAYER_LUNARG_api_dump"]);
    }

    #[test]
    fn layer_names_match_exactly() {
        let available = vec!["VK_LAYER_KHRONOS_validation_extra".to_string()];
        assert_eq!(
            missing_layers(&available, &["VK_LAYER_KHRONOS_validation"]),
            vec!["VK_LAYER_KHRONOS_validation"]
        );
    }

    #[test]
    fn fixed_size_names_stop_at_nul() {
        let mut chars = [0 as std::os::raw::c_char; 16];
        for (slot, byte) in chars.iter_mut().zip(b"VK_KHR_surface") {
            *slot = *byte as std::os::raw::c_char;
        }
        assert_eq!(c_chars_to_string(&chars), "VK_KHR_surface");
    }
}
