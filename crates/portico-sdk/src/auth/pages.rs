//! HTML pages shown in the browser after a callback

/// Page rendered when a login completed
pub fn render_success(title: &str, message: &str) -> String {
    render(title, message, "#10B981", "✓")
}

/// Page rendered for unknown, expired or rejected callbacks
pub fn render_error(title: &str, message: &str) -> String {
    render(title, message, "#EF4444", "✗")
}

fn render(title: &str, message: &str, accent: &str, icon: &str) -> String {
    let title = escape_html(title);
    let message = escape_html(message);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Portico</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            background: #111827;
            margin: 0;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
        }}
        .container {{
            background: #ffffff;
            padding: 48px;
            border-radius: 8px;
            max-width: 480px;
            width: 100%;
            text-align: center;
        }}
        .icon {{
            width: 64px;
            height: 64px;
            margin: 0 auto 24px;
            background: {accent};
            border-radius: 50%;
            color: white;
            font-size: 32px;
            line-height: 64px;
        }}
        h1 {{
            margin: 0 0 16px 0;
            font-size: 24px;
            color: #111827;
        }}
        p {{
            margin: 0;
            font-size: 16px;
            color: #6B7280;
            line-height: 1.5;
            word-break: break-word;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">{icon}</div>
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>
"#
    )
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
