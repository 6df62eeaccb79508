//! Translation template (POT) generation.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::ir::{Array, Element, Text};
use crate::table::quote;

/// Lists every text of a compiled tree in document order.
#[must_use]
pub fn collect_texts(root: &Array) -> Vec<Text> {
    let mut texts = Vec::new();
    walk(root, &mut texts);
    texts
}

fn walk(array: &Array, texts: &mut Vec<Text>) {
    for child in &array.children {
        if let Element::Text(text) = child {
            texts.push(text.clone());
        }
        for (_, nested) in child.child_arrays() {
            walk(nested, texts);
        }
    }
}

fn header(date: DateTime<Utc>) -> String {
    format!(
        r#"# SOME DESCRIPTIVE TITLE
# Copyright (C) YEAR THE PACKAGE'S COPYRIGHT HOLDER
# This file is distributed under the same license as the PACKAGE package.
# FIRST AUTHOR <EMAIL@ADDRESS>, YEAR.
#
#, fuzzy
msgid ""
msgstr ""
"Project-Id-Version: PACKAGE VERSION\n"
"Report-Msgid-Bugs-To: \n"
"POT-Creation-Date: {}+0000\n"
"PO-Revision-Date: YEAR-MO-DA HO:MI+ZONE\n"
"Last-Translator: FULL NAME <EMAIL@ADDRESS>\n"
"Language-Team: LANGUAGE <LL@li.org>\n"
"Language: \n"
"MIME-Version: 1.0\n"
"Content-Type: text/plain; charset=UTF-8\n"
"Content-Transfer-Encoding: 8bit\n"
"Plural-Forms: nplurals=INTEGER; plural=EXPRESSION;\n"

"#,
        date.format("%Y-%m-%d %H:%M")
    )
}

fn message(file: &str, text: &Text) -> String {
    let mut out = String::new();
    if !text.original.is_empty() {
        out.push_str("#. #+BEGIN: orginal-text\n");
        for line in text.original.split('\n') {
            let _ = writeln!(out, "#. {line}");
        }
        out.push_str("#. #+END: orginal-text\n");
    }
    if let Some(position) = text.position {
        let _ = writeln!(out, "#: {file}:{}", position.start.line);
    }
    out.push_str("#, python-brace-format\n");
    if text.text.contains('\n') {
        let lines: Vec<String> = text
            .text
            .split('\n')
            .map(|line| quote(&format!("{line}\n")))
            .collect();
        let _ = writeln!(out, "msgid \"\"\n{}", lines.join("\n"));
    } else {
        let _ = writeln!(out, "msgid {}", quote(&text.text));
    }
    if text.plural.is_some() {
        out.push_str("msgid_plural \"\"\nmsgstr[0] \"\"\n");
    } else {
        out.push_str("msgstr \"\"\n");
    }
    out
}

/// Renders a POT catalog with one entry per text, grouped by file.
pub fn compile_gettext<'a, I>(files: I, date: DateTime<Utc>) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [Text])>,
{
    let messages: Vec<String> = files
        .into_iter()
        .flat_map(|(file, texts)| texts.iter().map(move |text| message(file, text)))
        .collect();
    header(date) + &messages.join("\n")
}

#[cfg(test)]
mod tests {
    use brocatel_md::{Point, Position};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(text: &str, original: &str, line: usize, plural: bool) -> Text {
        Text {
            text: text.to_owned(),
            original: original.to_owned(),
            plural: plural.then(|| "v1".to_owned()),
            position: Some(Position::at(Point::new(line, 1))),
            ..Text::default()
        }
    }

    #[test]
    fn test_catalog() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 30).unwrap();
        let texts = vec![
            text("hello", "hello", 3, false),
            text("plural {v1}", "plural {1 + 2 ?}", 9, true),
        ];
        let pot = compile_gettext([("main.md", texts.as_slice())], date);
        assert!(pot.contains("\"POT-Creation-Date: 2024-03-09 07:05+0000\\n\"\n"));
        assert!(pot.ends_with(
            "\n\n#. #+BEGIN: orginal-text\n#. hello\n#. #+END: orginal-text\n#: main.md:3\n\
             #, python-brace-format\nmsgid \"hello\"\nmsgstr \"\"\n\n\
             #. #+BEGIN: orginal-text\n#. plural {1 + 2 ?}\n#. #+END: orginal-text\n#: main.md:9\n\
             #, python-brace-format\nmsgid \"plural {v1}\"\nmsgid_plural \"\"\nmsgstr[0] \"\"\n"
        ));
    }

    #[test]
    fn test_multiline_msgid() {
        let entry = message("a.md", &text("one\ntwo", "", 1, false));
        assert_eq!(
            entry,
            "#: a.md:1\n#, python-brace-format\nmsgid \"\"\n\"one\\n\"\n\"two\\n\"\nmsgstr \"\"\n"
        );
    }

    #[test]
    fn test_collect_texts_in_order() {
        let mut inner = Array::new(None);
        inner.children.push(Element::Text(text("b", "b", 2, false)));
        let mut root = Array::new(None);
        root.children = vec![
            Element::Text(text("a", "a", 1, false)),
            Element::Array(inner),
            Element::Text(text("c", "c", 3, false)),
        ];
        let texts: Vec<String> = collect_texts(&root).into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
