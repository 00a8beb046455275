// Copyright 2024 Zinc Labs Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use once_cell::sync::Lazy;

static INIT: Lazy<()> = Lazy::new(|| {
    let cfg = crate::get_config();
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cfg.log.level.clone()),
    );
    if cfg.log.json_format {
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                r#"{{"level":"{}","target":"{}","msg":"{}"}}"#,
                record.level(),
                record.target(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
});

/// Initializes the process-wide logger exactly once. Idempotent and safe to
/// call from every binary/test entry point, mirroring the teacher's
/// `env_logger`-based setup.
pub fn init() {
    Lazy::force(&INIT);
}
