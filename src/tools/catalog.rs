//! 工具目录：向模型声明可用的文件系统操作
//!
//! 纯静态元数据（名称、描述、参数 schema），原样交给后端用于 function calling；
//! 执行器不读取它，参数校验由各操作自己的前置检查负责。

use std::collections::BTreeMap;

use serde::Serialize;

/// 参数类型（Gemini Schema.type 的取值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    Object,
    String,
}

/// 单个参数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub ty: SchemaType,
    pub description: &'static str,
}

/// 参数对象 schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub ty: SchemaType,
    pub properties: BTreeMap<&'static str, PropertySchema>,
    pub required: Vec<&'static str>,
}

/// 一个工具的声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: ParameterSchema,
}

/// 便于书写的构造器：(参数名, 描述, 是否必填)
fn declare(
    name: &'static str,
    description: &'static str,
    params: &[(&'static str, &'static str, bool)],
) -> ToolDeclaration {
    ToolDeclaration {
        name,
        description,
        parameters: ParameterSchema {
            ty: SchemaType::Object,
            properties: params
                .iter()
                .map(|(k, d, _)| {
                    (
                        *k,
                        PropertySchema {
                            ty: SchemaType::String,
                            description: *d,
                        },
                    )
                })
                .collect(),
            required: params.iter().filter(|p| p.2).map(|p| p.0).collect(),
        },
    }
}

pub const READ_FILE: &str = "read_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const GLOB_SEARCH: &str = "glob_search";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const CREATE_DIRECTORY: &str = "create_directory";

/// 全部工具声明，顺序即提示词中的介绍顺序
pub fn all_tools() -> Vec<ToolDeclaration> {
    vec![
        declare(
            READ_FILE,
            "Read the contents of a file at the given path. Use this to examine source code, \
             configuration files, documentation, or any text file. Returns the file contents \
             along with metadata.",
            &[(
                "path",
                "The file path to read (absolute or relative to working directory)",
                true,
            )],
        ),
        declare(
            LIST_DIRECTORY,
            "List files and directories at the given path. Returns names with type indicators \
             (directories end with /). Useful for exploring project structure.",
            &[(
                "path",
                "The directory path to list. Use '.' or empty for current directory.",
                false,
            )],
        ),
        declare(
            GLOB_SEARCH,
            "Find files matching a glob pattern. Useful for finding all files of a certain type. \
             Examples: '*.rs' for Rust files in current dir, '**/*.rs' for all Rust files \
             recursively, 'src/**/*.ts' for TypeScript files in src.",
            &[(
                "pattern",
                "Glob pattern to match (e.g., '*.go', '**/*.ts', 'src/**/*.js')",
                true,
            )],
        ),
        declare(
            WRITE_FILE,
            "Create a new file or overwrite an existing file with the given content. Parent \
             directories are created as needed. Prefer edit_file for small changes to existing files.",
            &[
                (
                    "path",
                    "The file path to write (absolute or relative to working directory)",
                    true,
                ),
                ("content", "The complete content to write to the file", true),
            ],
        ),
        declare(
            EDIT_FILE,
            "Edit an existing file by replacing one exact occurrence of old_string with \
             new_string. old_string must appear exactly once in the file; include surrounding \
             context to make it unique.",
            &[
                (
                    "path",
                    "The file path to edit (absolute or relative to working directory)",
                    true,
                ),
                ("old_string", "The exact text to replace; must be unique in the file", true),
                ("new_string", "The text to replace it with", true),
            ],
        ),
        declare(
            CREATE_DIRECTORY,
            "Create a directory, including any missing parent directories. Succeeds if the \
             directory already exists.",
            &[(
                "path",
                "The directory path to create (absolute or relative to working directory)",
                true,
            )],
        ),
    ]
}
