//! Built-in default settings: directory layout, product naming, tool
//! paths and feature switches.

use std::path::Path;

use crate::builder::toolchain::{Tool, Toolchain};
use crate::core::platform::Platform;
use crate::core::target::ProductType;
use crate::settings::table::SettingsTable;

/// What the built-in layer depends on.
#[derive(Debug, Clone, Copy)]
pub struct DefaultsContext<'a> {
    pub project_name: &'a str,
    pub project_dir: &'a Path,
    pub target_name: &'a str,
    pub product_type: Option<ProductType>,
    pub platform: &'a Platform,
    pub configuration: &'a str,
    pub arch: &'a str,
    pub variant: &'a str,
    pub toolchain: &'a Toolchain,
}

const SWITCHES: &[(&str, &str)] = &[
    ("ACTION", "build"),
    ("BUILD_VARIANTS", "normal"),
    ("LINKER_DRIVER", "auto"),
    ("ENABLE_BITCODE", "NO"),
    ("BITCODE_GENERATION_MODE", "marker"),
    ("STRIP_BITCODE_FROM_COPIED_FILES", "NO"),
    ("SWIFT_INSTALL_MODULE", "YES"),
    ("SWIFT_INSTALL_OBJC_HEADER", "YES"),
    ("SWIFT_OBJC_INTERFACE_HEADER_NAME", "$(PRODUCT_MODULE_NAME)-Swift.h"),
    ("SWIFT_VERSION", "5.0"),
    ("SWIFT_MODULE_ONLY_ARCHS", ""),
    ("SWIFT_ENABLE_EXPLICIT_MODULES", "NO"),
    ("SWIFT_OPTIMIZATION_LEVEL", "-Onone"),
    ("SWIFT_OPTIMIZATION_LEVEL[config=Release]", "-O"),
    ("SWIFT_COMPILATION_MODE", "singlefile"),
    ("SWIFT_COMPILATION_MODE[config=Release]", "wholemodule"),
    ("BUILD_LIBRARY_FOR_DISTRIBUTION", "NO"),
    ("GCC_OPTIMIZATION_LEVEL", "0"),
    ("GCC_OPTIMIZATION_LEVEL[config=Release]", "s"),
    ("CODE_SIGNING_ALLOWED", "YES"),
    ("CODE_SIGN_IDENTITY", "-"),
    ("VALIDATE_PRODUCT", "YES"),
    ("IS_ZIPPERED", "NO"),
    ("STRING_CATALOG_GENERATE_SYMBOLS", "NO"),
    ("DEPENDENCIES", ""),
    ("EXCLUDED_SOURCE_FILE_NAMES", ""),
    ("INCLUDED_SOURCE_FILE_NAMES", ""),
    ("OTHER_CFLAGS", ""),
    ("OTHER_CPLUSPLUSFLAGS", "$(OTHER_CFLAGS)"),
    ("OTHER_SWIFT_FLAGS", ""),
    ("OTHER_LDFLAGS", ""),
    ("OTHER_LIBTOOLFLAGS", ""),
    ("GCC_PREPROCESSOR_DEFINITIONS", ""),
    ("HEADER_SEARCH_PATHS", ""),
    ("FRAMEWORK_SEARCH_PATHS", ""),
    ("LIBRARY_SEARCH_PATHS", ""),
    ("OBJECT_LIBRARY_RESPONSE_FILE_FORMAT", "unixShellQuotedSpaceSeparated"),
    ("FRAMEWORK_VERSION", "A"),
];

const DIRECTORIES: &[(&str, &str)] = &[
    ("TARGETNAME", "$(TARGET_NAME)"),
    ("PRODUCT_NAME", "$(TARGET_NAME)"),
    ("PRODUCT_MODULE_NAME", "$(PRODUCT_NAME:c99extidentifier)"),
    ("SYMROOT", "$(SRCROOT)/build"),
    ("OBJROOT", "$(SYMROOT)"),
    ("CONFIGURATION_BUILD_DIR", "$(SYMROOT)/$(CONFIGURATION)$(EFFECTIVE_PLATFORM_NAME)"),
    ("BUILT_PRODUCTS_DIR", "$(CONFIGURATION_BUILD_DIR)"),
    ("TARGET_BUILD_DIR", "$(BUILT_PRODUCTS_DIR)"),
    ("PROJECT_TEMP_DIR", "$(OBJROOT)/$(PROJECT_NAME).build"),
    (
        "CONFIGURATION_TEMP_DIR",
        "$(PROJECT_TEMP_DIR)/$(CONFIGURATION)$(EFFECTIVE_PLATFORM_NAME)",
    ),
    ("TARGET_TEMP_DIR", "$(CONFIGURATION_TEMP_DIR)/$(TARGET_NAME).build"),
    ("TEMP_DIR", "$(TARGET_TEMP_DIR)"),
    ("DERIVED_FILE_DIR", "$(TARGET_TEMP_DIR)/DerivedSources"),
    ("OBJECT_FILE_DIR", "$(TARGET_TEMP_DIR)/Objects"),
    ("OBJECT_FILE_DIR_normal", "$(OBJECT_FILE_DIR)-normal"),
    ("OBJECT_FILE_DIR_profile", "$(OBJECT_FILE_DIR)-profile"),
    ("OBJECT_FILE_DIR_debug", "$(OBJECT_FILE_DIR)-debug"),
    ("SCRIPTS_DIR", "$(TARGET_TEMP_DIR)/Script"),
];

/// Build the built-in layer for a target.
pub fn builtin_table(ctx: &DefaultsContext<'_>) -> SettingsTable {
    let mut table = SettingsTable::new();
    let platform = ctx.platform;

    let srcroot = ctx.project_dir.to_string_lossy();
    table.set("PROJECT_NAME", ctx.project_name);
    table.set("SRCROOT", srcroot.to_string());
    table.set("PROJECT_DIR", srcroot.to_string());
    table.set("TARGET_NAME", ctx.target_name);
    table.set("CONFIGURATION", ctx.configuration);
    table.set("PLATFORM_NAME", platform.name.as_str());
    table.set("EFFECTIVE_PLATFORM_NAME", platform.effective_platform_name.as_str());
    table.set("ARCHS_STANDARD", platform.standard_archs.join(" "));
    table.set("ARCHS", "$(ARCHS_STANDARD)");
    table.set("VALID_ARCHS", platform.valid_archs.join(" "));
    table.set("CURRENT_ARCH", ctx.arch);
    table.set("CURRENT_VARIANT", ctx.variant);
    table.set("TOOLCHAIN_IDENTIFIER", ctx.toolchain.identifier.as_str());
    if let Some(name) = &platform.deployment_target_setting {
        table.set("DEPLOYMENT_TARGET_SETTING_NAME", name.as_str());
    }

    for tool in Tool::ALL {
        let path = ctx.toolchain.tool_path(tool);
        table.set(tool.setting_name(), path.to_string_lossy().into_owned());
    }

    for (key, value) in DIRECTORIES.iter().chain(SWITCHES) {
        // every key in the constant tables is well formed
        if table.insert(key, *value).is_err() {
            tracing::warn!("ignoring malformed built-in setting `{}`", key);
        }
    }

    if let Some(product_type) = ctx.product_type {
        product_layout(&mut table, product_type, platform);
    }
    table
}

fn product_layout(table: &mut SettingsTable, product_type: ProductType, platform: &Platform) {
    if let Some(mach_o) = product_type.mach_o_type() {
        table.set("MACH_O_TYPE", mach_o);
    }

    let Some(extension) = product_type.wrapper_extension() else {
        let (prefix, suffix) = match product_type {
            ProductType::StaticLibrary => ("lib", ".a".to_string()),
            ProductType::DynamicLibrary => ("lib", format!(".{}", platform.dylib_extension)),
            ProductType::ObjectLibrary => ("", ".objlib".to_string()),
            _ => ("", String::new()),
        };
        table.set("EXECUTABLE_PREFIX", prefix);
        table.set("EXECUTABLE_SUFFIX", suffix);
        table.set(
            "EXECUTABLE_NAME",
            "$(EXECUTABLE_PREFIX)$(PRODUCT_NAME)$(EXECUTABLE_SUFFIX)",
        );
        table.set("FULL_PRODUCT_NAME", "$(EXECUTABLE_NAME)");
        table.set("EXECUTABLE_FOLDER_PATH", "");
        table.set("EXECUTABLE_PATH", "$(EXECUTABLE_NAME)");
        table.set("CONTENTS_FOLDER_PATH", "");
        table.set("UNLOCALIZED_RESOURCES_FOLDER_PATH", "");
        table.set("PUBLIC_HEADERS_FOLDER_PATH", "include");
        table.set("PRIVATE_HEADERS_FOLDER_PATH", "include/private");
        table.set("MODULES_FOLDER_PATH", "");
        return;
    };

    table.set("WRAPPER_EXTENSION", extension);
    table.set("WRAPPER_NAME", "$(PRODUCT_NAME).$(WRAPPER_EXTENSION)");
    table.set("FULL_PRODUCT_NAME", "$(WRAPPER_NAME)");
    table.set("EXECUTABLE_NAME", "$(PRODUCT_NAME)");

    let deep = !platform.shallow_bundles;
    let (contents, executables, resources) = match (product_type, deep) {
        (ProductType::Framework, true) => (
            "$(WRAPPER_NAME)/Versions/$(FRAMEWORK_VERSION)",
            "$(CONTENTS_FOLDER_PATH)",
            "$(CONTENTS_FOLDER_PATH)/Resources",
        ),
        (_, true) => (
            "$(WRAPPER_NAME)/Contents",
            "$(CONTENTS_FOLDER_PATH)/MacOS",
            "$(CONTENTS_FOLDER_PATH)/Resources",
        ),
        (_, false) => (
            "$(WRAPPER_NAME)",
            "$(CONTENTS_FOLDER_PATH)",
            "$(CONTENTS_FOLDER_PATH)",
        ),
    };
    table.set("CONTENTS_FOLDER_PATH", contents);
    table.set("EXECUTABLE_FOLDER_PATH", executables);
    table.set("EXECUTABLE_PATH", "$(EXECUTABLE_FOLDER_PATH)/$(EXECUTABLE_NAME)");
    table.set("UNLOCALIZED_RESOURCES_FOLDER_PATH", resources);
    table.set("PUBLIC_HEADERS_FOLDER_PATH", "$(CONTENTS_FOLDER_PATH)/Headers");
    table.set(
        "PRIVATE_HEADERS_FOLDER_PATH",
        "$(CONTENTS_FOLDER_PATH)/PrivateHeaders",
    );
    table.set("MODULES_FOLDER_PATH", "$(CONTENTS_FOLDER_PATH)/Modules");
    table.set("FRAMEWORKS_FOLDER_PATH", "$(CONTENTS_FOLDER_PATH)/Frameworks");
    table.set("PLUGINS_FOLDER_PATH", "$(CONTENTS_FOLDER_PATH)/PlugIns");
    table.set(
        "SHARED_SUPPORT_FOLDER_PATH",
        "$(CONTENTS_FOLDER_PATH)/SharedSupport",
    );
}
