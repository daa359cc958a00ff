//! Clash config generator: a static template with the local proxy
//! endpoint substituted in.

use std::path::Path;

const TEMPLATE: &str = r#"port: 7890
socks-port: 7891
mixed-port: 7893
allow-lan: false
mode: rule
log-level: info
ipv6: false
external-controller: 127.0.0.1:9090

dns:
  enable: true
  listen: 0.0.0.0:1053
  enhanced-mode: fake-ip
  nameserver:
    - 8.8.8.8
    - 1.1.1.1

tun:
  enable: true
  stack: system
  auto-route: true
  auto-detect-interface: true
  dns-hijack:
    - any:53

proxies:
  - name: "notetun"
    type: http
    server: 127.0.0.1
    port: {proxy_port}

proxy-groups:
  - name: "Proxy"
    type: select
    proxies:
      - "notetun"
      - "DIRECT"

rules:
  - DOMAIN-SUFFIX,ru,DIRECT
  - DOMAIN-SUFFIX,yandex.ru,DIRECT
  - DOMAIN-SUFFIX,yandex.net,DIRECT
  - DOMAIN-SUFFIX,storage.yandexcloud.net,DIRECT
  - DOMAIN-SUFFIX,cloud-api.yandex.net,DIRECT
  - MATCH,notetun
"#;

/// Render and write the Clash config to `<data_dir>/notetun_clash.yaml`.
/// The note transport's own traffic to `cloud-api.yandex.net` must stay
/// `DIRECT`, or routing it back through the proxy it carries deadlocks.
pub fn write_config(data_dir: &Path, proxy_port: u16) -> std::io::Result<std::path::PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let rendered = TEMPLATE.replace("{proxy_port}", &proxy_port.to_string());
    let path = data_dir.join("notetun_clash.yaml");
    std::fs::write(&path, rendered)?;
    Ok(path)
}
