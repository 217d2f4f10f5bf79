use askama::Template;

use crate::glyphs::GlyphRow;

/// Cell text of one table row. Every field is escaped by the template.
struct RowCells {
    sample: String,
    name: String,
    codepoint: String,
    entity: String,
    description: String,
}

impl From<&GlyphRow> for RowCells {
    fn from(row: &GlyphRow) -> Self {
        let decoded = row.decoded();
        Self {
            sample: decoded.sample,
            name: row.name.clone(),
            codepoint: row.codepoint_display(),
            entity: decoded.entity,
            description: row.description.clone(),
        }
    }
}

#[derive(Template)]
#[template(
    source = r##"<!doctype html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width,initial-scale=1">
    <title>Glyph Names (Bravura)</title>
    <style>
        body{margin:16px;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif;color:#111}
        .container{max-width:1200px;margin:0 auto}
        .controls{display:flex;gap:8px;margin-bottom:12px;align-items:center}
        input.search{flex:1;padding:8px;border:1px solid #ddd;border-radius:6px}
        .scroller{overflow:auto;max-height:72vh;border:1px solid #eee;border-radius:8px;background:#fff;padding:6px}
        table{width:100%;border-collapse:collapse}
        thead th{text-align:left;border-bottom:1px solid #ddd;padding:8px;background:#f8f8f8}
        tbody td{padding:8px;border-bottom:1px solid #eee;vertical-align:middle}
        tbody tr{cursor:pointer}
        tbody tr.selected{background:#e8f0fe}
        .symbol{font-family:'Bravura Text','Bravura',serif;font-size:28px;width:72px}
        .mono{font-family:ui-monospace,SFMono-Regular,Menlo,Monaco,Consolas,'Liberation Mono','Courier New',monospace}
        .total,.count{color:#666;margin-left:8px;white-space:nowrap}
    </style>
</head>
<body>
    <div class="container">
        <h1>Glyph Names (Bravura)</h1>
        <div class="controls">
            <input id="search" class="search" placeholder="Search by name, U+codepoint, or description">
            <button id="copyBtn" type="button" disabled>Copy row</button>
            <button id="copySelectedBtn" type="button" disabled>Copy selected</button>
            <div class="total">Total: {{ total }}</div>
            <div class="count" id="count">Showing: {{ total }} / {{ total }}</div>
        </div>

        <div class="scroller">
            <table>
                <thead>
                    <tr><th>Sample</th><th>Glyph name</th><th>Unicode</th><th>HTML entity</th><th>Description</th></tr>
                </thead>
                <tbody id="rows">
{%- for row in rows %}
<tr><td class="symbol">{{ row.sample }}</td><td class="mono">{{ row.name }}</td><td class="mono">{{ row.codepoint }}</td><td class="mono">{{ row.entity }}</td><td>{{ row.description }}</td></tr>
{%- endfor %}
                </tbody>
            </table>
        </div>
    </div>

    <script>
        const TOTAL = {{ total }};
        const search = document.getElementById('search');
        const rows = document.getElementById('rows');
        const count = document.getElementById('count');
        const copyBtn = document.getElementById('copyBtn');
        const copySelectedBtn = document.getElementById('copySelectedBtn');

        function selectedRow() {
            return rows.querySelector('tr.selected');
        }

        function setCopyEnabled(enabled) {
            copyBtn.disabled = !enabled;
            copySelectedBtn.disabled = !enabled;
        }

        function clearSelection() {
            const prev = selectedRow();
            if (prev) prev.classList.remove('selected');
            setCopyEnabled(false);
        }

        function filter() {
            const q = search.value.trim().toLowerCase();
            let shown = 0;
            rows.querySelectorAll('tr').forEach(tr => {
                const ok = !q || tr.textContent.toLowerCase().includes(q);
                tr.style.display = ok ? '' : 'none';
                if (ok) shown++;
            });
            const sel = selectedRow();
            if (sel && sel.style.display === 'none') clearSelection();
            count.textContent = 'Showing: ' + shown + ' / ' + TOTAL;
        }

        function cells(tr) {
            return {
                name: tr.children[1].textContent.trim(),
                code: tr.children[2].textContent.trim(),
                entity: tr.children[3].textContent.trim(),
            };
        }

        function joinParts(parts) {
            return parts.filter(Boolean).join(' ');
        }

        async function copyText(button, text) {
            try {
                await navigator.clipboard.writeText(text);
                const old = button.textContent;
                button.textContent = 'Copied';
                setTimeout(() => button.textContent = old, 1200);
            } catch (err) {
                alert('Copy failed: ' + err);
            }
        }

        search.addEventListener('input', filter);

        rows.querySelectorAll('tr').forEach(tr => {
            tr.addEventListener('click', () => {
                if (tr.classList.contains('selected')) {
                    clearSelection();
                    return;
                }
                clearSelection();
                tr.classList.add('selected');
                setCopyEnabled(true);
            });
        });

        copyBtn.addEventListener('click', () => {
            const sel = selectedRow();
            if (!sel) return;
            const c = cells(sel);
            copyText(copyBtn, joinParts([c.code, c.entity, c.name]));
        });

        copySelectedBtn.addEventListener('click', () => {
            const sel = selectedRow();
            if (!sel) return;
            const c = cells(sel);
            copyText(copySelectedBtn, joinParts([c.code, c.name]));
        });
    </script>
</body>
</html>
"##,
    ext = "html"
)]
struct GlyphTablePage {
    rows: Vec<RowCells>,
    total: usize,
}

/// Renders the complete, self-contained glyph table page.
pub fn render_table(rows: &[GlyphRow]) -> askama::Result<String> {
    GlyphTablePage {
        rows: rows.iter().map(RowCells::from).collect(),
        total: rows.len(),
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyphs::normalize_rows;
    use serde_json::json;

    fn body_rows(html: &str) -> usize {
        html.matches("<tr><td class=\"symbol\">").count()
    }

    #[test]
    fn empty_table_reports_zero_counts() {
        let html = render_table(&[]).unwrap();
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("Total: 0"));
        assert!(html.contains("Showing: 0 / 0"));
        assert!(html.contains("const TOTAL = 0;"));
        assert_eq!(body_rows(&html), 0);
        assert!(!html.contains("{{"));
    }

    #[test]
    fn renders_one_row_per_glyph() {
        let rows = normalize_rows(&json!({
            "noteheadBlack": {"codepoint": "U+E0A4", "description": "Black notehead"},
            "gClef": {"codepoint": "u+e050", "description": "G clef"},
            "broken": {"codepoint": "U+ZZZZ"}
        }));
        let html = render_table(&rows).unwrap();
        assert_eq!(body_rows(&html), 3);
        assert!(html.contains("Total: 3"));
        assert!(html.contains("Showing: 3 / 3"));
        assert!(html.contains(
            "<tr><td class=\"symbol\">\u{E0A4}</td><td class=\"mono\">noteheadBlack</td><td class=\"mono\">U+E0A4</td><td class=\"mono\">&amp;#xE0A4;</td><td>Black notehead</td></tr>"
        ));
        assert!(html.contains("<td class=\"mono\">U+E050</td>"));
        assert!(html.contains(
            "<tr><td class=\"symbol\"></td><td class=\"mono\">broken</td><td class=\"mono\">U+ZZZZ</td><td class=\"mono\"></td><td></td></tr>"
        ));
    }

    #[test]
    fn untrusted_text_is_escaped() {
        let rows = normalize_rows(&json!([
            {"name": "<script>alert(1)</script>", "codepoint": "U+003C", "description": "a & \"b\" 'c'"}
        ]));
        let html = render_table(&rows).unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;"));
        assert!(html.contains("a &amp; &quot;b&quot; &#"));
        assert!(!html.contains("'c'"));
        assert!(html.contains("<td class=\"symbol\">&lt;</td>"));
    }

    #[test]
    fn template_markers_in_row_text_are_kept_verbatim() {
        let rows = normalize_rows(&json!([
            {"name": "{{ROWS}}", "codepoint": "U+E050", "description": "see {{TOTAL}} here"},
            {"name": "{% for x in y %}", "description": "{{ total }}"}
        ]));
        let html = render_table(&rows).unwrap();
        assert_eq!(body_rows(&html), 2);
        assert!(html.contains("<td class=\"mono\">{{ROWS}}</td>"));
        assert!(html.contains("<td>see {{TOTAL}} here</td>"));
        assert!(html.contains("<td class=\"mono\">{% for x in y %}</td>"));
        assert!(html.contains("<td>{{ total }}</td>"));
        assert!(html.contains("Total: 2"));
    }

    #[test]
    fn page_carries_filter_and_copy_controls() {
        let html = render_table(&[]).unwrap();
        assert!(html.contains("id=\"search\""));
        assert!(html.contains("<button id=\"copyBtn\" type=\"button\" disabled>"));
        assert!(html.contains("<button id=\"copySelectedBtn\" type=\"button\" disabled>"));
        assert!(html.contains("search.addEventListener('input', filter);"));
        assert!(html.contains("navigator.clipboard.writeText(text)"));
        assert!(html.contains("alert('Copy failed: ' + err)"));
    }
}
