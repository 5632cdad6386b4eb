use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Cpp,
    Csharp,
    Java,
    Javascript,
    Sql,
    Rust,
    Lua,
    Bash,
    Zig,
    Scala,
    Go,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Python,
        Language::Cpp,
        Language::Csharp,
        Language::Java,
        Language::Javascript,
        Language::Sql,
        Language::Rust,
        Language::Lua,
        Language::Bash,
        Language::Zig,
        Language::Scala,
        Language::Go,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Sql => "sql",
            Language::Rust => "rust",
            Language::Lua => "lua",
            Language::Bash => "bash",
            Language::Zig => "zig",
            Language::Scala => "scala",
            Language::Go => "go",
        }
    }

    /// Syntax mode handed to the editing widget.
    pub fn editor_mode(self) -> &'static str {
        match self {
            Language::Bash => "shell",
            other => other.as_str(),
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Language::Java => "☕",
            Language::Sql => "⛁",
            Language::Rust => "⚙",
            Language::Lua => "☾",
            Language::Bash => "$",
            Language::Zig => "⚡",
            Language::Python
            | Language::Cpp
            | Language::Csharp
            | Language::Javascript
            | Language::Scala
            | Language::Go => "❮❯",
        }
    }

    pub fn source_file_name(self) -> &'static str {
        match self {
            Language::Python => "script.py",
            Language::Cpp => "main.cpp",
            Language::Csharp => "Program.cs",
            Language::Java => "Main.java",
            Language::Javascript => "script.js",
            Language::Sql => "script.sql",
            Language::Rust => "main.rs",
            Language::Lua => "script.lua",
            Language::Bash => "script.sh",
            Language::Zig => "main.zig",
            Language::Scala => "Main.scala",
            Language::Go => "main.go",
        }
    }

    pub fn starter_snippet(self) -> &'static str {
        match self {
            Language::Python => {
                "# Python Example\nprint('Hello from codepad!')\nname = input('What is your name? ')\nprint(f'Nice to meet you, {name}!')"
            }
            Language::Cpp => {
                "#include <iostream>\nusing namespace std;\n\nint main() {\n    cout << \"Hello from C++!\" << endl;\n    return 0;\n}"
            }
            Language::Csharp => {
                "using System;\n\nclass Program {\n    static void Main() {\n        Console.WriteLine(\"Hello from C#!\");\n    }\n}"
            }
            Language::Java => {
                "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello from Java!\");\n    }\n}"
            }
            Language::Javascript => {
                "// Node.js Example\nconsole.log('Hello from Node.js!');\n\nconst readline = require('readline').createInterface({\n    input: process.stdin,\n    output: process.stdout\n});\n\nreadline.question('What is your name? ', name => {\n    console.log(`Nice to meet you, ${name}!`);\n    readline.close();\n});"
            }
            Language::Sql => {
                "-- SQLite In-Memory Database\nCREATE TABLE Users (ID INT, Name TEXT);\nINSERT INTO Users VALUES (1, 'Neo'), (2, 'Trinity');\nSELECT * FROM Users;"
            }
            Language::Rust => "fn main() {\n    println!(\"Hello from Rust!\");\n}",
            Language::Lua => {
                "print('Hello from Lua!')\nprint('Enter your name:')\nlocal name = io.read()\nprint('Nice to meet you, ' .. name .. '!')"
            }
            Language::Bash => {
                "#!/bin/bash\n\necho 'Hello from Bash!'\necho 'Current directory:'\npwd\necho ''\necho 'Files:'\nls -la"
            }
            Language::Zig => {
                "const std = @import(\"std\");\n\npub fn main() void {\n    std.debug.print(\"Hello from Zig!\\n\", .{});\n}"
            }
            Language::Scala => "object Main extends App {\n    println(\"Hello from Scala!\")\n}",
            Language::Go => {
                "package main\n\nimport \"fmt\"\n\nfunc main() {\n    fmt.Println(\"Hello from Go!\")\n}"
            }
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|lang| *lang == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == normalized)
            .ok_or(UnknownLanguage(raw.to_string()))
    }
}
