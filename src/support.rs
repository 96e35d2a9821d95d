pub mod str {
    /// Escape the HTML special characters `& < > " ' ` =`.
    pub fn escape_html(s: &str) -> String {
        let mut output = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '<' => output.push_str("&lt;"),
                '>' => output.push_str("&gt;"),
                '"' => output.push_str("&quot;"),
                '&' => output.push_str("&amp;"),
                '\'' => output.push_str("&#x27;"),
                '`' => output.push_str("&#x60;"),
                '=' => output.push_str("&#x3D;"),
                _ => output.push(c),
            }
        }
        output
    }

    /// add indent for lines but last
    pub fn with_indent(s: &str, indent: &str) -> String {
        let mut output = String::with_capacity(s.len());
        let mut at_line_start = true;

        for c in s.chars() {
            if at_line_start {
                output.push_str(indent);
            }
            output.push(c);
            at_line_start = c == '\n';
        }

        output
    }

}
