//! Semantic Unit Extraction
//!
//! Line-oriented extraction of functions, classes, methods and modules
//! from source text. Python scopes by indentation; the C-family languages
//! (Rust, TypeScript, JavaScript, Java, Swift, C, C++) scope by brace
//! matching; SQL scopes by statement. Extraction never aborts a file:
//! anything unparseable is skipped and reported as a unit-level error.

use crate::enums::{Language, UnitType};

/// A unit extracted from source, before indexing metadata is attached
#[derive(Debug, Clone, PartialEq)]
pub struct RawUnit {
    /// Kind of unit
    pub unit_type: UnitType,
    /// Bare name
    pub name: String,
    /// Name qualified by its container (`Class.method`, `module::fn`)
    pub qualified_name: String,
    /// The declaration line, trimmed
    pub signature: String,
    /// 1-based first line
    pub start_line: usize,
    /// 1-based last line (inclusive)
    pub end_line: usize,
    /// Whether a documentation comment or docstring is attached
    pub has_docstring: bool,
}

/// Extract units from one file. Returns units plus accumulated unit-level
/// parse errors; errors never abort the file.
pub fn extract_units(language: Language, source: &str) -> (Vec<RawUnit>, Vec<String>) {
    match language {
        Language::Python => extract_python(source),
        Language::Sql => extract_sql(source),
        _ => extract_braced(language, source),
    }
}

// ============================================================================
// PYTHON (indentation-scoped)
// ============================================================================

fn extract_python(source: &str) -> (Vec<RawUnit>, Vec<String>) {
    let lines: Vec<&str> = source.lines().collect();
    let mut units = Vec::new();
    let mut errors = Vec::new();

    // Stack of (indent, class name) for method qualification
    let mut class_stack: Vec<(usize, String)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();
        class_stack.retain(|(class_indent, _)| *class_indent < indent);

        let (keyword, unit_type) = if trimmed.starts_with("def ") || trimmed.starts_with("async def ")
        {
            ("def ", UnitType::Function)
        } else if trimmed.starts_with("class ") {
            ("class ", UnitType::Class)
        } else {
            continue;
        };

        let after = match trimmed.split_once(keyword) {
            Some((_, rest)) => rest,
            None => continue,
        };
        let name: String = after
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            errors.push(format!("line {}: unnamed {} declaration", i + 1, keyword.trim()));
            continue;
        }

        let end_line = python_block_end(&lines, i, indent);
        let unit_type = if unit_type == UnitType::Function && !class_stack.is_empty() {
            UnitType::Method
        } else {
            unit_type
        };
        let qualified_name = match class_stack.last() {
            Some((_, class_name)) if unit_type == UnitType::Method => {
                format!("{}.{}", class_name, name)
            }
            _ => name.clone(),
        };

        units.push(RawUnit {
            unit_type,
            name: name.clone(),
            qualified_name,
            signature: trimmed.trim_end().to_string(),
            start_line: i + 1,
            end_line: end_line + 1,
            has_docstring: python_has_docstring(&lines, i, end_line),
        });

        if unit_type == UnitType::Class {
            class_stack.push((indent, name));
        }
    }

    (units, errors)
}

/// Last line index of an indentation-scoped block starting at `start`
fn python_block_end(lines: &[&str], start: usize, indent: usize) -> usize {
    let mut end = start;
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let line_indent = line.len() - trimmed.len();
        if line_indent <= indent {
            break;
        }
        end = i;
    }
    end
}

fn python_has_docstring(lines: &[&str], start: usize, end: usize) -> bool {
    for line in lines.iter().take(end + 1).skip(start + 1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''");
    }
    false
}

// ============================================================================
// BRACE-SCOPED LANGUAGES
// ============================================================================

/// Container context while scanning a brace-scoped file
struct Container {
    name: String,
    /// Brace depth at which the container's body lives
    depth: usize,
    /// `::` for Rust impl/mod, `.` elsewhere
    separator: &'static str,
    /// Methods inside this container, or nested items for modules
    methods: bool,
}

fn extract_braced(language: Language, source: &str) -> (Vec<RawUnit>, Vec<String>) {
    let lines: Vec<&str> = source.lines().collect();
    let mut units = Vec::new();
    let mut errors = Vec::new();
    let mut containers: Vec<Container> = Vec::new();
    let mut depth: usize = 0;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_line_comment(trimmed) {
            continue;
        }

        if let Some(decl) = match language {
            Language::Rust => rust_declaration(trimmed),
            Language::TypeScript | Language::JavaScript => ts_declaration(trimmed),
            Language::Java | Language::Swift | Language::C | Language::Cpp => {
                cfam_declaration(trimmed)
            }
            _ => None,
        } {
            let (mut unit_type, name, is_container, separator) = decl;
            if name.is_empty() {
                errors.push(format!("line {}: unnamed declaration", i + 1));
            } else {
                let in_methods_container =
                    containers.last().is_some_and(|c| c.methods && c.depth == depth);
                if unit_type == UnitType::Function && in_methods_container {
                    unit_type = UnitType::Method;
                }
                let qualified_name = match containers.last() {
                    Some(container) if container.depth == depth => {
                        format!("{}{}{}", container.name, container.separator, name)
                    }
                    _ => name.clone(),
                };
                let end_line = if trimmed.ends_with(';') || !line_opens_block(trimmed) {
                    i
                } else {
                    braced_block_end(&lines, i)
                };

                units.push(RawUnit {
                    unit_type,
                    name: name.clone(),
                    qualified_name,
                    signature: trimmed.trim_end_matches('{').trim_end().to_string(),
                    start_line: i + 1,
                    end_line: end_line + 1,
                    has_docstring: has_doc_comment(&lines, i, language),
                });

                if is_container && line_opens_block(trimmed) {
                    containers.push(Container {
                        name,
                        depth: depth + 1,
                        separator,
                        methods: unit_type != UnitType::Module,
                    });
                }
            }
        } else if language == Language::Rust {
            // impl blocks qualify their fns but are not units themselves
            if let Some(name) = rust_impl_target(trimmed) {
                if line_opens_block(trimmed) {
                    containers.push(Container {
                        name,
                        depth: depth + 1,
                        separator: "::",
                        methods: true,
                    });
                }
            }
        }

        let (opens, closes) = count_braces(trimmed);
        depth = depth.saturating_add(opens).saturating_sub(closes);
        containers.retain(|c| c.depth <= depth);
    }

    (units, errors)
}

type Declaration = (UnitType, String, bool, &'static str);

fn rust_declaration(line: &str) -> Option<Declaration> {
    let stripped = line
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub(super) ")
        .trim_start_matches("pub ")
        .trim_start_matches("async ")
        .trim_start_matches("unsafe ")
        .trim_start_matches("const ")
        .trim_start_matches("extern \"C\" ");

    if let Some(rest) = stripped.strip_prefix("fn ") {
        return Some((UnitType::Function, identifier(rest), false, "::"));
    }
    for (keyword, unit_type) in [
        ("struct ", UnitType::Class),
        ("enum ", UnitType::Class),
        ("trait ", UnitType::Class),
        ("mod ", UnitType::Module),
    ] {
        if let Some(rest) = stripped.strip_prefix(keyword) {
            return Some((unit_type, identifier(rest), unit_type == UnitType::Module, "::"));
        }
    }
    None
}

/// `impl Foo {` or `impl Trait for Foo {` → `Foo`
fn rust_impl_target(line: &str) -> Option<String> {
    let rest = line.strip_prefix("impl")?;
    // Skip a generic parameter list: impl<T> ...
    let rest = if let Some(generics) = rest.strip_prefix('<') {
        generics.split_once('>').map(|(_, tail)| tail).unwrap_or("")
    } else {
        rest
    };
    let rest = rest.trim_start();
    let rest = match rest.split_once(" for ") {
        Some((_, target)) => target,
        None => rest,
    };
    let name = identifier(rest);
    if name.is_empty() { None } else { Some(name) }
}

fn ts_declaration(line: &str) -> Option<Declaration> {
    let stripped = line
        .trim_start_matches("export ")
        .trim_start_matches("default ")
        .trim_start_matches("async ");

    if let Some(rest) = stripped.strip_prefix("function ") {
        return Some((UnitType::Function, identifier(rest), false, "."));
    }
    if let Some(rest) = stripped
        .strip_prefix("abstract class ")
        .or_else(|| stripped.strip_prefix("class "))
    {
        return Some((UnitType::Class, identifier(rest), true, "."));
    }
    // const name = (...) => / const name = function
    if let Some(rest) = stripped.strip_prefix("const ").or_else(|| stripped.strip_prefix("let ")) {
        let name = identifier(rest);
        if !name.is_empty() && (line.contains("=>") || line.contains("= function")) {
            return Some((UnitType::Function, name, false, "."));
        }
    }
    None
}

fn cfam_declaration(line: &str) -> Option<Declaration> {
    let stripped = line
        .trim_start_matches("public ")
        .trim_start_matches("private ")
        .trim_start_matches("protected ")
        .trim_start_matches("internal ")
        .trim_start_matches("open ")
        .trim_start_matches("final ")
        .trim_start_matches("static ")
        .trim_start_matches("abstract ");

    for keyword in ["class ", "struct ", "interface ", "protocol ", "enum "] {
        if let Some(rest) = stripped.strip_prefix(keyword) {
            return Some((UnitType::Class, identifier(rest), true, "."));
        }
    }
    if let Some(rest) = stripped.strip_prefix("func ") {
        // Swift
        return Some((UnitType::Function, identifier(rest), false, "."));
    }

    // Heuristic C/C++/Java function definition: `ret name(args...) {`
    if stripped.ends_with('{') && stripped.contains('(') {
        let head = stripped.split('(').next().unwrap_or("");
        let name = head.split_whitespace().last().unwrap_or("");
        let name: String = name
            .trim_start_matches('*')
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        const CONTROL: &[&str] = &["if", "for", "while", "switch", "catch", "do", "else", "return"];
        if !name.is_empty() && !CONTROL.contains(&name.as_str()) && head.split_whitespace().count() >= 2
        {
            return Some((UnitType::Function, name, false, "."));
        }
    }
    None
}

fn identifier(rest: &str) -> String {
    rest.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn is_line_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*")
}

fn line_opens_block(trimmed: &str) -> bool {
    trimmed.contains('{')
}

/// `(opens, closes)` outside of string literals, approximately
fn count_braces(line: &str) -> (usize, usize) {
    let mut opens = 0;
    let mut closes = 0;
    let mut in_string = false;
    let mut prev = ' ';
    for c in line.chars() {
        match c {
            '"' if prev != '\\' => in_string = !in_string,
            '{' if !in_string => opens += 1,
            '}' if !in_string => closes += 1,
            _ => {}
        }
        prev = c;
    }
    (opens, closes)
}

/// Last line index of a brace-matched block opening at `start`
fn braced_block_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i64 = 0;
    let mut seen_open = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let (opens, closes) = count_braces(line);
        depth += opens as i64;
        if opens > 0 {
            seen_open = true;
        }
        depth -= closes as i64;
        if seen_open && depth <= 0 {
            return i;
        }
    }
    lines.len().saturating_sub(1)
}

fn has_doc_comment(lines: &[&str], start: usize, language: Language) -> bool {
    if start == 0 {
        return false;
    }
    let prev = lines[start - 1].trim();
    match language {
        Language::Rust => prev.starts_with("///") || prev.starts_with("//!"),
        _ => prev.starts_with("*") || prev.starts_with("/**") || prev.ends_with("*/"),
    }
}

// ============================================================================
// SQL (statement-scoped)
// ============================================================================

fn extract_sql(source: &str) -> (Vec<RawUnit>, Vec<String>) {
    let lines: Vec<&str> = source.lines().collect();
    let mut units = Vec::new();
    let errors = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let upper = trimmed.to_uppercase();
        if !upper.starts_with("CREATE ") {
            continue;
        }

        let after_create = upper
            .trim_start_matches("CREATE ")
            .trim_start_matches("OR REPLACE ");
        let (object_kind, unit_type) = if after_create.starts_with("FUNCTION")
            || after_create.starts_with("PROCEDURE")
            || after_create.starts_with("TRIGGER")
        {
            (after_create.split_whitespace().next().unwrap_or(""), UnitType::Function)
        } else if after_create.starts_with("TABLE") || after_create.starts_with("VIEW") {
            (after_create.split_whitespace().next().unwrap_or(""), UnitType::Module)
        } else {
            continue;
        };

        // Name is the token after the object kind (and optional IF NOT EXISTS)
        let original = trimmed
            .get(trimmed.len() - after_create.len()..)
            .unwrap_or(trimmed);
        let name = original
            .split_whitespace()
            .skip(1)
            .find(|token| {
                let upper = token.to_uppercase();
                !matches!(upper.as_str(), "IF" | "NOT" | "EXISTS")
            })
            .map(|token| {
                token
                    .split('(')
                    .next()
                    .unwrap_or("")
                    .trim_matches(|c: char| c == ';' || c == '"' || c == '`')
                    .to_string()
            })
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        // Statement ends at the next `;`
        let mut end = i;
        for (j, candidate) in lines.iter().enumerate().skip(i) {
            end = j;
            if candidate.contains(';') {
                break;
            }
        }

        units.push(RawUnit {
            unit_type,
            name: name.clone(),
            qualified_name: name,
            signature: format!("CREATE {} …", object_kind),
            start_line: i + 1,
            end_line: end + 1,
            has_docstring: i > 0 && lines[i - 1].trim_start().starts_with("--"),
        });
    }

    (units, errors)
}

// ============================================================================
// TESTS
// ============================================================================
