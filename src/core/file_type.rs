//! File types and source languages.
//!
//! File types are derived from the path extension unless the file reference
//! carries an explicit type identifier.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Source language of a compilable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    C,
    ObjectiveC,
    Cxx,
    ObjectiveCxx,
    Assembly,
    Swift,
}

impl Language {
    /// The `-x` dialect name passed to clang.
    pub fn clang_dialect(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::ObjectiveC => "objective-c",
            Language::Cxx => "c++",
            Language::ObjectiveCxx => "objective-c++",
            Language::Assembly => "assembler-with-cpp",
            Language::Swift => "swift",
        }
    }

    /// Human-readable name used in diagnostics.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::ObjectiveC => "Objective-C",
            Language::Cxx => "C++",
            Language::ObjectiveCxx => "Objective-C++",
            Language::Assembly => "assembly",
            Language::Swift => "Swift",
        }
    }

    /// Whether linking objects of this language needs the C++ driver.
    pub fn needs_cxx_linker(&self) -> bool {
        matches!(self, Language::Cxx | Language::ObjectiveCxx)
    }
}

/// Classification of a file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Source(Language),
    Header,
    ObjectFile,
    StaticArchive,
    DynamicLibrary,
    Framework,
    ObjectLibrary,
    /// A directory of prebuilt per-triple static libraries with an
    /// `info.json` manifest.
    ArtifactBundle,
    Strings,
    StringsDict,
    StringCatalog,
    Storyboard,
    Xib,
    Png,
    PropertyList,
    RezSource,
    RezResource,
    AppleScript,
    Folder,
    Text,
    Unknown,
}

impl FileType {
    /// Derive a file type from a path's extension.
    pub fn from_path(path: &Path) -> FileType {
        let Some(ext) = path.extension() else {
            return FileType::Unknown;
        };
        let ext = ext.to_string_lossy();

        // Uppercase .C is C++ on case-sensitive filesystems
        if ext == "C" {
            return FileType::Source(Language::Cxx);
        }

        match ext.to_ascii_lowercase().as_str() {
            "c" => FileType::Source(Language::C),
            "m" => FileType::Source(Language::ObjectiveC),
            "cpp" | "cc" | "cxx" | "c++" => FileType::Source(Language::Cxx),
            "mm" => FileType::Source(Language::ObjectiveCxx),
            "s" => FileType::Source(Language::Assembly),
            "swift" => FileType::Source(Language::Swift),
            "h" | "hh" | "hpp" | "hxx" | "pch" => FileType::Header,
            "o" => FileType::ObjectFile,
            "a" => FileType::StaticArchive,
            "dylib" | "so" | "tbd" => FileType::DynamicLibrary,
            "framework" => FileType::Framework,
            "objlib" => FileType::ObjectLibrary,
            "artifactbundle" => FileType::ArtifactBundle,
            "strings" => FileType::Strings,
            "stringsdict" => FileType::StringsDict,
            "xcstrings" => FileType::StringCatalog,
            "storyboard" => FileType::Storyboard,
            "xib" => FileType::Xib,
            "png" => FileType::Png,
            "plist" => FileType::PropertyList,
            "r" => FileType::RezSource,
            "rsrc" => FileType::RezResource,
            "applescript" => FileType::AppleScript,
            "txt" | "md" | "json" => FileType::Text,
            _ => FileType::Unknown,
        }
    }

    /// Parse an explicit type identifier as found in serialized models.
    ///
    /// Accepts both short names (`c`, `swift`) and the dotted identifiers
    /// project files use (`sourcecode.c.c`, `sourcecode.swift`).
    pub fn from_identifier(id: &str) -> Option<FileType> {
        let ty = match id {
            "c" | "sourcecode.c.c" => FileType::Source(Language::C),
            "objc" | "sourcecode.c.objc" => FileType::Source(Language::ObjectiveC),
            "cpp" | "sourcecode.cpp.cpp" => FileType::Source(Language::Cxx),
            "objcpp" | "sourcecode.cpp.objcpp" => FileType::Source(Language::ObjectiveCxx),
            "asm" | "sourcecode.asm" => FileType::Source(Language::Assembly),
            "swift" | "sourcecode.swift" => FileType::Source(Language::Swift),
            "header" | "sourcecode.c.h" => FileType::Header,
            "object" | "compiled.mach-o.objfile" => FileType::ObjectFile,
            "archive" | "archive.ar" => FileType::StaticArchive,
            "dylib" | "compiled.mach-o.dylib" => FileType::DynamicLibrary,
            "framework" | "wrapper.framework" => FileType::Framework,
            "objlib" | "compiled.object-library" => FileType::ObjectLibrary,
            "artifactbundle" | "wrapper.artifactbundle" => FileType::ArtifactBundle,
            "strings" | "text.plist.strings" => FileType::Strings,
            "stringsdict" | "text.plist.stringsdict" => FileType::StringsDict,
            "xcstrings" | "text.json.xcstrings" => FileType::StringCatalog,
            "storyboard" | "file.storyboard" => FileType::Storyboard,
            "xib" | "file.xib" => FileType::Xib,
            "png" | "image.png" => FileType::Png,
            "plist" | "text.plist.xml" => FileType::PropertyList,
            "rez" | "sourcecode.rez" => FileType::RezSource,
            "rsrc" | "archive.rsrc" => FileType::RezResource,
            "applescript" | "sourcecode.applescript" => FileType::AppleScript,
            "folder" => FileType::Folder,
            "text" => FileType::Text,
            _ => return None,
        };
        Some(ty)
    }

    /// The dotted identifier used in rule matching and diagnostics.
    pub fn identifier(&self) -> &'static str {
        match self {
            FileType::Source(Language::C) => "sourcecode.c.c",
            FileType::Source(Language::ObjectiveC) => "sourcecode.c.objc",
            FileType::Source(Language::Cxx) => "sourcecode.cpp.cpp",
            FileType::Source(Language::ObjectiveCxx) => "sourcecode.cpp.objcpp",
            FileType::Source(Language::Assembly) => "sourcecode.asm",
            FileType::Source(Language::Swift) => "sourcecode.swift",
            FileType::Header => "sourcecode.c.h",
            FileType::ObjectFile => "compiled.mach-o.objfile",
            FileType::StaticArchive => "archive.ar",
            FileType::DynamicLibrary => "compiled.mach-o.dylib",
            FileType::Framework => "wrapper.framework",
            FileType::ObjectLibrary => "compiled.object-library",
            FileType::ArtifactBundle => "wrapper.artifactbundle",
            FileType::Strings => "text.plist.strings",
            FileType::StringsDict => "text.plist.stringsdict",
            FileType::StringCatalog => "text.json.xcstrings",
            FileType::Storyboard => "file.storyboard",
            FileType::Xib => "file.xib",
            FileType::Png => "image.png",
            FileType::PropertyList => "text.plist.xml",
            FileType::RezSource => "sourcecode.rez",
            FileType::RezResource => "archive.rsrc",
            FileType::AppleScript => "sourcecode.applescript",
            FileType::Folder => "folder",
            FileType::Text => "text",
            FileType::Unknown => "file",
        }
    }

    /// The language of a compilable source, if any.
    pub fn language(&self) -> Option<Language> {
        match self {
            FileType::Source(lang) => Some(*lang),
            _ => None,
        }
    }

    /// Whether the file holds linkable code (and is therefore signable and
    /// may carry bitcode).
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            FileType::Framework | FileType::DynamicLibrary | FileType::ObjectFile
        )
    }

    /// Whether the file can appear as a linker input.
    pub fn is_linkable(&self) -> bool {
        matches!(
            self,
            FileType::ObjectFile
                | FileType::StaticArchive
                | FileType::DynamicLibrary
                | FileType::Framework
                | FileType::ObjectLibrary
                | FileType::ArtifactBundle
        )
    }
}
