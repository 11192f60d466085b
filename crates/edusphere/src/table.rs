use edusphere_core::{MetricKey, MetricSnapshot};

pub struct TableFormatter {
    metric_width: usize,
    value_width: usize,
}

impl TableFormatter {
    pub fn new(snapshot: &MetricSnapshot) -> Self {
        let metric_width = MetricKey::ALL
            .iter()
            .map(|k| k.label().len())
            .max()
            .unwrap_or(16)
            .clamp(6, 40); // Between "Metric" header min and a sane max

        let value_width = snapshot
            .iter()
            .map(|(_, v)| v.to_string().len())
            .max()
            .unwrap_or(1)
            .clamp(5, 20);

        Self {
            metric_width,
            value_width,
        }
    }

    pub fn print_table(&self, snapshot: &MetricSnapshot) {
        for line in self.render(snapshot) {
            println!("{}", line);
        }
    }

    pub fn render(&self, snapshot: &MetricSnapshot) -> Vec<String> {
        let mut lines = vec![self.top_border(), self.header_row(), self.separator()];
        for key in MetricKey::ALL {
            let value = snapshot
                .get(key)
                .map_or_else(|| "-".to_string(), |v| v.to_string());
            lines.push(format!(
                "│ {:<width_metric$} │ {:>width_value$} │",
                truncate(key.label(), self.metric_width),
                value,
                width_metric = self.metric_width,
                width_value = self.value_width,
            ));
        }
        lines.push(self.bottom_border());
        lines
    }

    fn header_row(&self) -> String {
        format!(
            "│ {:<width_metric$} │ {:>width_value$} │",
            "Metric",
            "Value",
            width_metric = self.metric_width,
            width_value = self.value_width,
        )
    }

    fn top_border(&self) -> String {
        self.border('┌', '┬', '┐')
    }

    fn separator(&self) -> String {
        self.border('├', '┼', '┤')
    }

    fn bottom_border(&self) -> String {
        self.border('└', '┴', '┘')
    }

    fn border(&self, left: char, middle: char, right: char) -> String {
        format!(
            "{}{}{}{}{}",
            left,
            "─".repeat(self.metric_width + 2),
            middle,
            "─".repeat(self.value_width + 2),
            right,
        )
    }
}

/// Truncate a string to a maximum display width, adding "..." if truncated.
///
/// Counts characters, not bytes.
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        format!("{:<width$}", s, width = max_len)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{:<width$}", format!("{}...", truncated), width = max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_pads_short_strings() {
        assert_eq!(truncate("abc", 6), "abc   ");
    }

    #[test]
    fn test_truncate_long_strings() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_render_has_one_row_per_metric() {
        let snapshot = MetricSnapshot::zeroed().with(MetricKey::TotalCourses, 12);
        let formatter = TableFormatter::new(&snapshot);
        let lines = formatter.render(&snapshot);

        // borders, header and separator plus one row per key
        assert_eq!(lines.len(), 4 + MetricKey::ALL.len());
        assert!(lines.iter().any(|l| l.contains(MetricKey::TotalCourses.label()) && l.contains("12")));

        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn test_render_marks_missing_values() {
        let snapshot = MetricSnapshot::default();
        let formatter = TableFormatter::new(&snapshot);
        let lines = formatter.render(&snapshot);
        assert!(lines[3].trim_end().ends_with("- │"));
    }
}
