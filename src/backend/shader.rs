// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. The demo reads precompiled
// modules from disk at startup (see build.rs for how they get there).

use anyhow::{bail, Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V blob into words, in either byte order
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        bail!("SPIR-V size {} is not a multiple of 4", bytes.len());
    }

    // read_spv also fixes up byte-swapped modules
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Failed to read SPIR-V words")?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => bail!("Not a SPIR-V module (magic {:#010x})", other),
        None => bail!("Empty SPIR-V module"),
    }
}

pub fn read_spirv_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to open file! ({:?})", path))?;
    parse_spirv(&bytes).with_context(|| format!("Invalid shader {:?}", path))
}

/// Load SPIR-V from `path` and create a shader module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_spirv_file(path)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    log::debug!("Loaded shader {:?} ({} words)", path, code.len());

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module!")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_little_endian_module() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[1], 0x0001_0000);
    }

    #[test]
    fn accepts_byte_swapped_module() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_module() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 0]);
        bytes.pop();
        let err = parse_spirv(&bytes).unwrap_err();
        assert!(err.to_string().contains("multiple of 4"));
    }

    #[test]
    fn rejects_non_spirv_data() {
        let err = parse_spirv(b"#version 450\n\0\0\0").unwrap_err();
        assert!(err.to_string().starts_with("Not a SPIR-V module"));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse_spirv(&[]).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spirv_file(Path::new("shaders/does-not-exist.spv")).unwrap_err();
        assert!(err.to_string().contains("does-not-exist.spv"));
    }
}
