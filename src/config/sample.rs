//! Annotated example configuration printed by `--sample-config`.

/// A complete, valid configuration watching an LDAP audit log.
pub const SAMPLE_CONFIG: &str = r#"---
# Each top-level key names a file to watch, either absolute or relative to
# this configuration file. Files are read one line at a time unless a
# 'record-delimiter' regex is given: then lines are collected into a record
# until a line matches the delimiter, and triggers match whole records.
# Record regexes usually want the (?ms) flags so that ^ and $ match at line
# boundaries and '.' also matches newlines.
#
# A file holds named 'triggers'. A trigger has a 'match-regex' and named
# 'actions' that run in order when a record matches:
#
#   type: local   runs 'run-template' through the shell
#   type: rest    sends a request to 'url-template', with 'http-verb'
#                 (default POST), an optional 'json-template' body and
#                 optional Basic-Auth 'user' and 'pass'
#
# Named captures in the match-regex, written (?P<name>...), are available
# to templates as {{ name }} (the {{ .name }} form works too). A name the
# regex does not capture renders as "<no value>".
#
# A regex or template starting with '@' is read from the file it names,
# relative to this configuration file, minus its final line break. Quote
# such values since '@' cannot start a plain YAML scalar.
'audit_db.log':
  record-delimiter: '^#'
  triggers:
    password-lock:
      match-regex: '(?ms)(?P<dn>^dn:\s+.+?)\n.+?replace:\s+pwdAccountLockedTime\npwdAccountLockedTime:\s+(?P<datetime>\d{14}Z)'
      actions:
        syslog:
          type: local
          run-template: 'logger -t INFO "{{ dn }} locked at {{ datetime }}"'
        remote-server-1:
          type: rest
          url-template: 'http://localhost/v1/accounts/lock?date={{ datetime }}'
          json-template: '{"dn": "{{ dn }}"}'
          user: foo
          pass: bar
    password-unlock:
      match-regex: '(?ms)(?P<dn>^dn:\s+.+?)\n.+?delete:\s+pwdAccountLockedTime\n.+?modifyTimestamp:\s+(?P<datetime>\d{14}Z)'
      actions:
        syslog:
          type: local
          run-template: 'logger -t INFO "{{ dn }} unlocked at {{ datetime }}"'
        remote-server-1:
          type: rest
          http-verb: PUT
          url-template: 'http://localhost/v1/accounts/unlock?date={{ datetime }}'
          user: foo
          pass: bar
"#;
