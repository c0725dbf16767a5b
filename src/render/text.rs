use crate::model::{LoadProfile, RuntimeRow};
use std::io::{self, Write};

/// `label,rt0,rt1,...`; a task that never finished leaves its cell empty.
pub fn write_runtime_csv(rows: &[RuntimeRow], out: &mut dyn Write) -> io::Result<()> {
    for row in rows {
        let mut line = row.label.clone();
        for rt in &row.runtimes {
            line.push(',');
            if let Some(rt) = rt {
                line.push_str(&rt.to_string());
            }
        }
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// All three sparse load series as `series,offset,count` rows.
pub fn write_load_table(profile: &LoadProfile, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "series,offset,count")?;
    for (name, series) in profile.series() {
        for sample in series {
            writeln!(out, "{},{},{}", name, sample.offset, sample.count)?;
        }
    }
    Ok(())
}
