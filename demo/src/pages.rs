//! Page markup. Deliberately plain: templating is not what this demo shows.

const DATASTAR_JS: &str =
    "https://cdn.jsdelivr.net/gh/starfederation/datastar@main/bundles/datastar.js";

fn shell(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Datastar + hyper</title>
    <script type="module" src="{script}"></script>
  </head>
  <body>
    <aside id="sidebar">
      <nav>
        <ul>
          <li><a href="/">Home</a></li>
          <li><a href="/chat">Chat</a></li>
          <li><a href="/counter">Counter</a></li>
          <li><a href="/clock">Clock</a></li>
          <li><a href="/slider">Slider</a></li>
          <li><a href="/time">Time</a></li>
        </ul>
      </nav>
    </aside>
    <main id="document">
      <div id="content">
{content}
      </div>
    </main>
  </body>
</html>
"#,
        title = title,
        script = DATASTAR_JS,
        content = content,
    )
}

struct Example {
    title: &'static str,
    description: &'static str,
    path: &'static str,
}

const EXAMPLES: &[Example] = &[
    Example {
        title: "Chat",
        description: "Messages appended by the server every second",
        path: "/chat",
    },
    Example {
        title: "Counter",
        description: "Client-side signals only",
        path: "/counter",
    },
    Example {
        title: "Clock",
        description: "One long-lived event stream pushing the time",
        path: "/clock",
    },
    Example {
        title: "Slider",
        description: "Signals sent to the server and patched back",
        path: "/slider",
    },
    Example {
        title: "Time",
        description: "Polling a signal every five seconds",
        path: "/time",
    },
];

pub fn welcome() -> String {
    let cards: String = EXAMPLES
        .iter()
        .map(|e| {
            format!(
                "        <article>\n          <h4><a href=\"{}\">{}</a></h4>\n          <p>{}</p>\n        </article>\n",
                e.path, e.title, e.description
            )
        })
        .collect();
    let content = format!(
        r#"        <hgroup>
          <h1>Datastar + hyper</h1>
          <p>Real-time web apps with server-sent events and no client-side frameworks</p>
        </hgroup>
{}"#,
        cards
    );
    shell("Home", &content)
}

pub fn chat() -> String {
    shell(
        "Chat",
        r#"        <h1>Chat</h1>
        <div data-signals="{lastMsg: ''}">
          <ul id="chat" data-on-interval__duration.1s.leading="@get('/sse/chat')"></ul>
          <p>Last: <strong data-text="$lastMsg"></strong></p>
          <button data-on-click="@post('/sse/chat/clear')">Clear</button>
        </div>"#,
    )
}

pub fn counter() -> String {
    shell(
        "Counter",
        r#"        <h1>Counter</h1>
        <div role="group" data-signals="{counter: 0}" style="align-items: center">
          <button data-on-click="$counter -= 1">-</button>
          <h2 style="text-align: center" data-text="$counter"></h2>
          <button data-on-click="$counter += 1">+</button>
        </div>"#,
    )
}

pub fn clock() -> String {
    shell(
        "Clock",
        r#"        <h1>Clock</h1>
        <h2 data-on-load="@get('/sse/clock')"><span id="server-time">--:--:--</span></h2>"#,
    )
}

pub fn slider() -> String {
    shell(
        "Slider",
        r#"        <h1>Slider</h1>
        <div data-signals="{slider: 0}">
          <div class="grid">
            <input type="range" min="0" max="99" data-bind-slider
              data-on-interval__duration.1s.leading="@get('/sse/slider')">
            <output data-text="$slider"></output>
          </div>
        </div>"#,
    )
}

pub fn time(now: &str) -> String {
    let content = format!(
        r#"        <h1>Time</h1>
        <p id="clock" data-on-interval__duration.5s="@get('/api/time')"
          data-on-signal-patch="el.textContent = patch.now">{}</p>"#,
        now
    );
    shell("Time", &content)
}
