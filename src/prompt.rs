//! Interactive filter selection for the CLI.

use std::io::{self, BufRead, Write};

use imageflow::processing::{Filter, FilterParams, ProcessingMode};
use imageflow::{FilterPipeline, FilterRegistry};

/// One numbered line of the filter menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuEntry {
    pub id: &'static str,
    pub accelerated: bool,
    pub label: String,
}

pub enum Choice {
    Finished,
    Invalid,
    Filter(Box<dyn Filter>),
}

/// CPU entry for every registered filter, followed by its GPU entry when one exists.
pub fn build_menu(registry: &FilterRegistry) -> Vec<MenuEntry> {
    let mut menu = Vec::new();
    for info in registry.iter() {
        menu.push(MenuEntry {
            id: info.id,
            accelerated: false,
            label: format!("{} (CPU)", info.display_name),
        });
        if info.has_gpu_version() {
            menu.push(MenuEntry {
                id: info.id,
                accelerated: true,
                label: format!("{} (GPU)", info.display_name),
            });
        }
    }
    menu
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_value<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
) -> io::Result<Option<String>> {
    write!(out, "{}", question)?;
    out.flush()?;
    read_line(input)
}

/// Asks for filter-specific parameters. Unparseable answers keep the
/// registry defaults.
fn prompt_params<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    id: &str,
) -> io::Result<FilterParams> {
    let mut params = FilterParams::new();
    let (key, question) = match id {
        "brightness" => (
            "factor",
            "Brightness factor (0.5 = darker, 1.0 = unchanged, 2.0 = brighter): ",
        ),
        "boxblur" => ("radius", "Blur radius (1-10): "),
        _ => return Ok(params),
    };
    if let Some(answer) = prompt_value(input, out, question)? {
        match answer.parse::<f32>() {
            Ok(value) if value.is_finite() => {
                params.insert(key.to_string(), value);
            }
            _ => writeln!(out, "Invalid value, using the default")?,
        }
    }
    Ok(params)
}

pub fn choose_filter<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    registry: &FilterRegistry,
    menu: &[MenuEntry],
) -> io::Result<Choice> {
    writeln!(out, "\nSelect a filter:")?;
    for (i, entry) in menu.iter().enumerate() {
        writeln!(out, "  {:>2}. {}", i + 1, entry.label)?;
    }
    writeln!(out, "   0. Finish")?;

    let Some(answer) = prompt_value(input, out, "\nChoice: ")? else {
        return Ok(Choice::Finished);
    };
    let Ok(index) = answer.parse::<usize>() else {
        return Ok(Choice::Invalid);
    };
    if index == 0 {
        return Ok(Choice::Finished);
    }
    let Some(entry) = menu.get(index - 1) else {
        return Ok(Choice::Invalid);
    };
    let params = prompt_params(input, out, entry.id)?;
    Ok(registry
        .create_with_params(entry.id, entry.accelerated, &params)
        .map_or(Choice::Invalid, Choice::Filter))
}

/// Reads menu choices until the user finishes (or input ends).
pub fn build_pipeline<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    registry: &FilterRegistry,
    mode: ProcessingMode,
) -> io::Result<FilterPipeline> {
    let menu = build_menu(registry);
    let mut pipeline = FilterPipeline::with_mode(mode);
    loop {
        match choose_filter(input, out, registry, &menu)? {
            Choice::Finished => break,
            Choice::Invalid => writeln!(out, "Invalid choice")?,
            Choice::Filter(filter) => {
                pipeline.push(filter);
                writeln!(out, "Filter added")?;
                writeln!(out, "Current pipeline: {}", pipeline.describe())?;
            }
        }
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{build_menu, build_pipeline};
    use imageflow::{FilterRegistry, ProcessingMode};

    fn run(script: &str) -> (imageflow::FilterPipeline, String) {
        let registry = FilterRegistry::with_builtin_filters();
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let pipeline =
            build_pipeline(&mut input, &mut out, &registry, ProcessingMode::Auto).unwrap();
        (pipeline, String::from_utf8(out).unwrap())
    }

    #[test]
    fn menu_lists_gpu_variants_after_cpu_entries() {
        let menu = build_menu(&FilterRegistry::with_builtin_filters());
        let labels: Vec<&str> = menu.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Box Blur (CPU)",
                "Box Blur (GPU)",
                "Brightness (CPU)",
                "Grayscale (CPU)",
                "Grayscale (GPU)",
                "Invert (CPU)",
                "Sepia Tone (CPU)",
            ]
        );
    }

    #[test]
    fn builds_pipeline_with_parameters() {
        // boxblur radius 4, brightness 1.5, grayscale GPU, finish.
        let (pipeline, out) = run("1\n4\n3\n1.5\n5\n0\n");
        assert_eq!(
            pipeline.describe(),
            "3 filter(s): Box Blur (radius=4) → Brightness (1.50) → Grayscale (GPU)"
        );
        assert!(out.contains("Blur radius (1-10): "));
        assert!(out.contains("Filter added"));
    }

    #[test]
    fn invalid_choices_are_reported_and_skipped() {
        let (pipeline, out) = run("42\nabc\n6\n0\n");
        assert_eq!(pipeline.describe(), "1 filter(s): Invert");
        assert_eq!(out.matches("Invalid choice").count(), 2);
    }

    #[test]
    fn bad_parameter_keeps_default() {
        let (pipeline, out) = run("2\nwide\n");
        assert_eq!(pipeline.describe(), "1 filter(s): Box Blur (radius=2, GPU)");
        assert!(out.contains("Invalid value"));
    }

    #[test]
    fn end_of_input_finishes() {
        let (pipeline, _) = run("");
        assert!(pipeline.is_empty());
    }
}
