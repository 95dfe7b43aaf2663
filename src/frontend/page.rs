pub const INDEX_HTML: &str = r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Intelligence Gathering</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 0; color: #1d1d1f; background: #f4f5f7; }
    header { background: #1f2a37; color: #fff; padding: 1rem 2rem; }
    header h1 { margin: 0; font-size: 1.4rem; }
    main { display: grid; grid-template-columns: 2fr 1fr; gap: 1rem; padding: 1rem 2rem; }
    .card { background: #fff; border: 1px solid #ddd; padding: 1rem; border-radius: 8px; }
    #chat { height: 60vh; overflow-y: auto; }
    .msg { margin: 0.5rem 0; padding: 0.6rem 0.8rem; border-radius: 6px; white-space: pre-wrap; }
    .user { background: #e3f2fd; margin-left: 15%; }
    .agent { background: #f1f3f4; margin-right: 15%; }
    .error { background: #fdecea; }
    form { display: flex; gap: 0.5rem; margin-top: 1rem; }
    textarea { flex: 1; padding: 0.5rem; min-height: 3rem; }
    button { padding: 0.6rem 1rem; cursor: pointer; }
    .bar { background: #e5e7eb; border-radius: 4px; height: 12px; overflow: hidden; }
    .fill { background: #2563eb; height: 100%; width: 0; transition: width 0.3s; }
    ul { padding-left: 1.2rem; }
    #report { display: none; }
  </style>
</head>
<body>
  <header><h1>Intelligence Gathering</h1></header>
  <main>
    <section class="card">
      <div id="chat">
        <div class="msg agent">Describe what you want investigated: a person, an organization, a location or how they are connected.</div>
      </div>
      <form id="chatForm">
        <textarea id="message" placeholder="Type your request or answer..."></textarea>
        <button type="submit" id="sendBtn">Send</button>
      </form>
    </section>
    <aside>
      <div class="card">
        <h3>Status</h3>
        <div id="status">Ready</div>
        <h3>Progress</h3>
        <div class="bar"><div class="fill" id="progress"></div></div>
        <div id="progressLabel">0%</div>
        <button id="reportBtn" disabled>Generate Report</button>
      </div>
      <div class="card">
        <h3>Key Facts</h3>
        <ul id="facts"></ul>
      </div>
      <div class="card" id="report">
        <h3 id="reportTitle"></h3>
        <p id="reportSummary"></p>
        <ul id="reportFindings"></ul>
        <a id="reportLink" href="#">Download PDF</a>
      </div>
    </aside>
  </main>

  <script>
    let sessionId = null;
    const chat = document.getElementById('chat');
    const form = document.getElementById('chatForm');
    const input = document.getElementById('message');
    const sendBtn = document.getElementById('sendBtn');
    const reportBtn = document.getElementById('reportBtn');

    function addMessage(text, cls) {
      const div = document.createElement('div');
      div.className = 'msg ' + cls;
      div.textContent = text;
      chat.appendChild(div);
      chat.scrollTop = chat.scrollHeight;
    }

    function setList(id, items) {
      const list = document.getElementById(id);
      list.innerHTML = '';
      for (const item of items) {
        const li = document.createElement('li');
        li.textContent = item;
        list.appendChild(li);
      }
    }

    function setProgress(value) {
      document.getElementById('progress').style.width = value + '%';
      document.getElementById('progressLabel').textContent = value + '%';
    }

    form.addEventListener('submit', async (event) => {
      event.preventDefault();
      const message = input.value.trim();
      if (!message) return;
      addMessage(message, 'user');
      input.value = '';
      sendBtn.disabled = true;
      document.getElementById('status').textContent = 'Agents working...';
      try {
        const res = await fetch('/send_message', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ message, session_id: sessionId })
        });
        const data = await res.json();
        if (!res.ok) {
          addMessage(data.error || 'Request failed', 'agent error');
          return;
        }
        sessionId = data.session_id;
        addMessage(data.response, data.session_id ? 'agent' : 'agent error');
        document.getElementById('status').textContent = data.agent_status;
        setList('facts', data.key_facts);
        setProgress(data.progress);
        reportBtn.disabled = !sessionId;
      } catch (err) {
        addMessage('Network error: ' + err, 'agent error');
      } finally {
        sendBtn.disabled = false;
      }
    });

    reportBtn.addEventListener('click', async () => {
      reportBtn.disabled = true;
      document.getElementById('status').textContent = 'Generating report...';
      try {
        const res = await fetch('/generate_report', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ session_id: sessionId })
        });
        const data = await res.json();
        if (data.status !== 'success') {
          addMessage(data.message, 'agent error');
          return;
        }
        const report = data.report_data;
        document.getElementById('report').style.display = 'block';
        document.getElementById('reportTitle').textContent = report.title;
        document.getElementById('reportSummary').textContent = report.summary;
        setList('reportFindings', report.key_findings);
        document.getElementById('reportLink').href = report.download_link;
        document.getElementById('status').textContent = data.agent_status;
        addMessage(data.message, 'agent');
      } catch (err) {
        addMessage('Network error: ' + err, 'agent error');
      } finally {
        reportBtn.disabled = !sessionId;
      }
    });
  </script>
</body>
</html>
"##;
