//! Management UI returned for plain browser requests

/// Single-page account manager served at `/`.
///
/// Talks to the JSON management endpoints; opaque to the tunnel core.
pub const UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Gateway Accounts</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; color: #222; }
  h1 { font-size: 1.4rem; }
  table { width: 100%; border-collapse: collapse; margin: 1rem 0; }
  th, td { text-align: left; padding: .4rem .6rem; border-bottom: 1px solid #ddd; font-size: .9rem; }
  code { background: #f4f4f4; padding: .1rem .3rem; border-radius: 3px; }
  input { padding: .4rem; margin-right: .5rem; width: 20rem; max-width: 60%; }
  button { padding: .4rem .8rem; cursor: pointer; }
  .error { color: #b00020; }
</style>
</head>
<body>
<h1>Gateway Accounts</h1>
<p>Accounts listed here are accepted by the tunnel in addition to the static identifier.</p>
<form id="create-form">
  <input id="uuid" placeholder="client identifier (uuid)" required>
  <input id="label" placeholder="label (optional)" style="width:10rem">
  <button type="submit">Create</button>
</form>
<p id="message" class="error"></p>
<table>
  <thead><tr><th>Identifier</th><th>Label</th><th></th></tr></thead>
  <tbody id="accounts"></tbody>
</table>
<script>
async function refresh() {
  const res = await fetch('/api/accounts');
  const body = await res.json();
  const rows = (body.accounts || []).map(a =>
    `<tr><td><code>${a.uuid}</code></td><td>${a.label || ''}</td>` +
    `<td><button data-uuid="${a.uuid}">delete</button></td></tr>`).join('');
  document.getElementById('accounts').innerHTML = rows;
  for (const btn of document.querySelectorAll('button[data-uuid]')) {
    btn.onclick = async () => {
      await fetch('/api/delete', { method: 'POST', headers: {'Content-Type': 'application/json'},
        body: JSON.stringify({ uuid: btn.dataset.uuid }) });
      refresh();
    };
  }
}
document.getElementById('create-form').onsubmit = async (e) => {
  e.preventDefault();
  const uuid = document.getElementById('uuid').value.trim();
  const label = document.getElementById('label').value.trim() || null;
  const res = await fetch('/api/create', { method: 'POST', headers: {'Content-Type': 'application/json'},
    body: JSON.stringify({ uuid, label }) });
  const body = await res.json();
  document.getElementById('message').textContent = body.error || '';
  if (res.ok) { document.getElementById('uuid').value = ''; refresh(); }
};
refresh();
</script>
</body>
</html>
"#;
