//! Synthetic GRIB2 message builder.
//!
//! Produces small but structurally complete edition 2 messages: sections
//! 0, 1, 3 (template 3.0), 4 (template 4.0 or 4.8), 5 (template 5.0),
//! 6, 7 and 8. `NaN` values are encoded as bitmap-masked points.

/// Build a GRIB2 message with the specified parameters.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition
    ni: u32,
    nj: u32,
    first_lat: f64,
    first_lon: f64,
    di: f64,
    dj: f64,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: u32,
    forecast_hour: u32,
    accumulation_hours: Option<u32>,
    // Data
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 2 m temperature on a coarse 10° global grid, 288.15 K everywhere.
    pub fn new_aigfs() -> Self {
        let ni = 36;
        let nj = 19;
        Self {
            discipline: 0,
            center: 7,
            year: 2026,
            month: 1,
            day: 3,
            hour: 0,
            ni,
            nj,
            first_lat: 90.0,
            first_lon: 0.0,
            di: 10.0,
            dj: 10.0,
            scanning_mode: 0,
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_value: 2,
            forecast_hour: 0,
            accumulation_hours: None,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Grid dimensions and spacing; resets data to zeros.
    pub fn with_grid(mut self, ni: u32, nj: u32, first_lat: f64, first_lon: f64, di: f64, dj: f64) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.first_lat = first_lat;
        self.first_lon = first_lon;
        self.di = di;
        self.dj = dj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// GRIB2 scanning mode flags (Flag Table 3.4). Data is taken as given,
    /// already in this storage order.
    pub fn with_scanning_mode(mut self, flags: u8) -> Self {
        self.scanning_mode = flags;
        self
    }

    pub fn with_parameter(mut self, discipline: u8, category: u8, number: u8) -> Self {
        self.discipline = discipline;
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    /// Encode as an accumulation (template 4.8) ending at the forecast hour.
    pub fn with_accumulation(mut self, hours: u32) -> Self {
        self.accumulation_hours = Some(hours);
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// `PARAM:level` as a NOMADS inventory would list this message.
    pub fn inventory_key(&self) -> String {
        let param = match (self.discipline, self.param_category, self.param_number) {
            (0, 0, 0) => "TMP".to_string(),
            (0, 1, 8) => "APCP".to_string(),
            (0, 2, 2) => "UGRD".to_string(),
            (0, 2, 3) => "VGRD".to_string(),
            (0, 3, 1) => "PRMSL".to_string(),
            (d, c, n) => format!("var discipline={} category={} number={}", d, c, n),
        };
        let level = match self.level_type {
            1 => "surface".to_string(),
            101 => "mean sea level".to_string(),
            103 => format!("{} m above ground", self.level_value),
            t => format!("level type {} value {}", t, self.level_value),
        };
        format!("{}:{}", param, level)
    }

    /// Inventory line for this message at `offset`.
    pub fn inventory_line(&self, number: usize, offset: usize) -> String {
        let forecast = match (self.accumulation_hours, self.forecast_hour) {
            (Some(acc), end) => format!("{}-{} hour acc fcst", end.saturating_sub(acc), end),
            (None, 0) => "anl".to_string(),
            (None, h) => format!("{} hour fcst", h),
        };
        format!(
            "{}:{}:d={:04}{:02}{:02}{:02}:{}:{}:",
            number,
            offset,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.inventory_key(),
            forecast
        )
    }

    /// Build the complete GRIB2 message bytes.
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];
        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        for section in &sections {
            message.extend_from_slice(section);
        }
        message.extend_from_slice(b"7777");
        message
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values.iter().copied().filter(|v| !v.is_nan()).collect()
    }

    fn has_bitmap(&self) -> bool {
        self.data_values.iter().any(|v| v.is_nan())
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);
        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Start of forecast
        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0);
        section.push(0);
        section.push(0); // Operational
        section.push(1); // Forecast
        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&72u32.to_be_bytes());
        section.push(3);
        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Spherical earth, radius 6371229 m
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        let i_sign = if self.scanning_mode & 0x80 != 0 { -1.0 } else { 1.0 };
        let j_sign = if self.scanning_mode & 0x40 != 0 { 1.0 } else { -1.0 };
        let last_lat = self.first_lat + j_sign * (self.nj - 1) as f64 * self.dj;
        let last_lon = self.first_lon + i_sign * (self.ni - 1) as f64 * self.di;

        section.extend_from_slice(&signed_micro(self.first_lat));
        section.extend_from_slice(&signed_micro(self.first_lon));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&signed_micro(last_lat));
        section.extend_from_slice(&signed_micro(last_lon));
        section.extend_from_slice(&micro(self.di).to_be_bytes());
        section.extend_from_slice(&micro(self.dj).to_be_bytes());
        section.push(self.scanning_mode);
        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let template: u16 = if self.accumulation_hours.is_some() { 8 } else { 0 };
        let length: u32 = if template == 8 { 58 } else { 34 };
        let start_hour = self
            .accumulation_hours
            .map(|acc| self.forecast_hour.saturating_sub(acc))
            .unwrap_or(self.forecast_hour);

        section.extend_from_slice(&length.to_be_bytes());
        section.push(4);
        section.extend_from_slice(&0u16.to_be_bytes()); // Coordinate values
        section.extend_from_slice(&template.to_be_bytes());
        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Forecast
        section.push(0);
        section.push(96); // Generating process
        section.extend_from_slice(&0u16.to_be_bytes());
        section.push(0);
        section.push(1); // Hours
        section.extend_from_slice(&start_hour.to_be_bytes());
        section.push(self.level_type);
        section.push(0);
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(255);
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        if let Some(acc) = self.accumulation_hours {
            // End of overall time interval (approximate, not validated)
            section.extend_from_slice(&self.year.to_be_bytes());
            section.extend_from_slice(&[self.month, self.day, self.hour, 0, 0]);
            section.push(1); // One time range
            section.extend_from_slice(&0u32.to_be_bytes()); // Missing values
            section.push(1); // Accumulation
            section.push(2); // Successive times
            section.push(1); // Hours
            section.extend_from_slice(&acc.to_be_bytes());
            section.push(255);
            section.extend_from_slice(&0u32.to_be_bytes());
        }
        section
    }

    fn packing(&self) -> (f32, i16, u8) {
        let present = self.present_values();
        let (min_val, max_val) = present.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );
        if present.is_empty() {
            return (0.0, 0, 0);
        }
        let range = max_val - min_val;
        if range == 0.0 {
            return (min_val, 0, 0);
        }
        // value = R + X * 2^E with X in 16 bits
        let e = (range as f64 / 65535.0).log2().ceil() as i16;
        (min_val, e, 16)
    }

    fn build_section5(&self) -> Vec<u8> {
        let (reference, e, bits) = self.packing();
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);
        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0
        section.extend_from_slice(&reference.to_be_bytes());
        section.extend_from_slice(&signed_i16(e));
        section.extend_from_slice(&0u16.to_be_bytes()); // Decimal scale factor
        section.push(bits);
        section.push(0); // Floating point
        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();
        if !self.has_bitmap() {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255);
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, v) in self.data_values.iter().enumerate() {
            if !v.is_nan() {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }
        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0);
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let (reference, e, bits) = self.packing();
        let mut packed = Vec::new();
        if bits > 0 {
            let scale = 2f64.powi(e as i32);
            for v in self.present_values() {
                let x = ((v as f64 - reference as f64) / scale).round().clamp(0.0, 65535.0) as u16;
                packed.extend_from_slice(&x.to_be_bytes());
            }
        }

        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed);
        section
    }
}

/// Concatenate messages into one file.
pub fn build_file(messages: &[Grib2Builder]) -> Vec<u8> {
    messages.iter().flat_map(|m| m.build()).collect()
}

/// Inventory text matching [`build_file`] output for the same messages.
pub fn build_inventory(messages: &[Grib2Builder]) -> String {
    let mut offset = 0;
    let mut text = String::new();
    for (i, message) in messages.iter().enumerate() {
        text.push_str(&message.inventory_line(i + 1, offset));
        text.push('\n');
        offset += message.build().len();
    }
    text
}

fn micro(degrees: f64) -> u32 {
    (degrees.abs() * 1e6).round() as u32
}

/// Sign-magnitude microdegrees.
fn signed_micro(degrees: f64) -> [u8; 4] {
    let mut raw = micro(degrees) & 0x7FFF_FFFF;
    if degrees < 0.0 {
        raw |= 0x8000_0000;
    }
    raw.to_be_bytes()
}

fn signed_i16(value: i16) -> [u8; 2] {
    let mut raw = value.unsigned_abs() & 0x7FFF;
    if value < 0 {
        raw |= 0x8000;
    }
    raw.to_be_bytes()
}
