//! GRIB2 test data generator.
//!
//! Creates small synthetic GRIB2 messages with a known layout: Section 1,
//! optional Section 2, one Section 3, then a Section 4..7 group per field.
//! Data is always simple packed (template 5.0) with 16 bits per value, or
//! 0 bits when every packed value is equal.

/// Grid definition emitted in Section 3.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpec {
    /// Template 3.0. Coordinates in microdegrees.
    LatLon {
        ni: u32,
        nj: u32,
        la1: i32,
        lo1: i32,
        la2: i32,
        lo2: i32,
        di: u32,
        dj: u32,
    },
    /// Template 3.30 Lambert conformal.
    Lambert { nx: u32, ny: u32 },
}

impl GridSpec {
    pub fn num_points(&self) -> usize {
        match self {
            GridSpec::LatLon { ni, nj, .. } => (*ni as usize) * (*nj as usize),
            GridSpec::Lambert { nx, ny } => (*nx as usize) * (*ny as usize),
        }
    }

    pub fn template_number(&self) -> u16 {
        match self {
            GridSpec::LatLon { .. } => 0,
            GridSpec::Lambert { .. } => 30,
        }
    }
}

/// How a field's Section 6 is written.
#[derive(Debug, Clone, PartialEq)]
pub enum BitmapSpec {
    /// Indicator 255.
    None,
    /// Indicator 0 with one flag per grid point.
    Present(Vec<bool>),
    /// Indicator 254: reuse the bitmap of an earlier field.
    Previous,
}

/// One field of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub category: u8,
    pub number: u8,
    /// 0, 1 or 8.
    pub product_template: u16,
    pub level_type: u8,
    pub level_value: u32,
    pub forecast_hour: u32,
    /// Time ranges written in template 4.8.
    pub time_ranges: u8,
    pub decimal_scale: i16,
    /// One value per grid point; masked points are not packed.
    pub values: Vec<f32>,
    pub bitmap: BitmapSpec,
}

/// Build a minimal GRIB2 message with the specified parameters
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    local_use: Option<Vec<u8>>,
    grid: GridSpec,
    scanning_mode: u8,
    fields: Vec<FieldSpec>,
}

impl Grib2Builder {
    /// 10x10 lat/lon grid over CONUS with 2 m temperature.
    pub fn new_gfs() -> Self {
        let grid = GridSpec::LatLon {
            ni: 10,
            nj: 10,
            la1: 45_000_000,
            lo1: 230_000_000,
            la2: 35_000_000,
            lo2: 240_000_000,
            di: 1_000_000,
            dj: 1_000_000,
        };
        let points = grid.num_points();
        Self {
            discipline: 0, // Meteorological
            center: 7,     // NCEP
            year: 2025,
            month: 12,
            day: 10,
            hour: 12,
            local_use: None,
            grid,
            scanning_mode: 0b0100_0000, // +i, +j, i consecutive
            fields: vec![FieldSpec {
                category: 0,
                number: 0, // TMP
                product_template: 0,
                level_type: 103, // m above ground
                level_value: 2,
                forecast_hour: 0,
                time_ranges: 1,
                decimal_scale: 0,
                values: vec![288.15; points],
                bitmap: BitmapSpec::None,
            }],
        }
    }

    /// 20x15 lat/lon grid in the MRMS local discipline.
    pub fn new_mrms() -> Self {
        let mut builder = Self::new_gfs()
            .with_discipline(209)
            .with_parameter(0, 16)
            .with_level(102, 500);
        builder.center = 161; // NSSL
        builder.grid = GridSpec::LatLon {
            ni: 20,
            nj: 15,
            la1: 54_995_000,
            lo1: 230_005_000,
            la2: 40_005_000,
            lo2: 249_995_000,
            di: 10_000,
            dj: 10_000,
        };
        builder.with_constant_value(-999.0)
    }

    /// HRRR-style Lambert conformal grid.
    pub fn new_lambert(nx: u32, ny: u32) -> Self {
        let mut builder = Self::new_gfs();
        builder.grid = GridSpec::Lambert { nx, ny };
        builder.with_constant_value(0.0)
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    pub fn with_local_use(mut self, data: Vec<u8>) -> Self {
        self.local_use = Some(data);
        self
    }

    /// Resize the lat/lon grid; values of the current field reset to zero.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        match &mut self.grid {
            GridSpec::LatLon { ni: i, nj: j, .. } => {
                *i = ni;
                *j = nj;
            }
            GridSpec::Lambert { nx, ny } => {
                *nx = ni;
                *ny = nj;
            }
        }
        self.with_constant_value(0.0)
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        let field = self.current();
        field.category = category;
        field.number = number;
        self
    }

    pub fn with_product_template(mut self, template: u16) -> Self {
        self.current().product_template = template;
        self
    }

    pub fn with_time_ranges(mut self, ranges: u8) -> Self {
        self.current().time_ranges = ranges;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        let field = self.current();
        field.level_type = level_type;
        field.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.current().forecast_hour = hour;
        self
    }

    pub fn with_decimal_scale(mut self, scale: i16) -> Self {
        self.current().decimal_scale = scale;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        let n = self.grid.num_points();
        self.current().values = vec![value; n];
        self
    }

    /// Values rising linearly from `min_val` towards `max_val`.
    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = self.grid.num_points();
        self.current().values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.current().values = data;
        self
    }

    /// Mask grid points; `false` entries are left out of Section 7.
    pub fn with_bitmap(mut self, mask: Vec<bool>) -> Self {
        self.current().bitmap = BitmapSpec::Present(mask);
        self
    }

    pub fn with_previous_bitmap(mut self) -> Self {
        self.current().bitmap = BitmapSpec::Previous;
        self
    }

    /// Start another field sharing the grid. It begins as a copy of the
    /// previous field with no bitmap.
    pub fn add_field(mut self) -> Self {
        let mut next = self.fields[self.fields.len() - 1].clone();
        next.bitmap = BitmapSpec::None;
        self.fields.push(next);
        self
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn current(&mut self) -> &mut FieldSpec {
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(self.build_section1());
        if let Some(local) = &self.local_use {
            body.extend(section(2, local));
        }
        body.extend(self.build_section3());

        let mut previous_mask: Option<&Vec<bool>> = None;
        for field in &self.fields {
            let mask = match &field.bitmap {
                BitmapSpec::None => None,
                BitmapSpec::Present(mask) => {
                    previous_mask = Some(mask);
                    Some(mask)
                }
                BitmapSpec::Previous => previous_mask,
            };
            let packed_values: Vec<f32> = match mask {
                Some(mask) => field
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|&(_, &present)| present)
                    .map(|(&v, _)| v)
                    .collect(),
                None => field.values.clone(),
            };

            body.extend(self.build_section4(field));
            let (section5, section7) = pack_simple(&packed_values, field.decimal_scale);
            body.extend(section5);
            body.extend(build_section6(&field.bitmap, self.grid.num_points()));
            body.extend(section7);
        }

        // Section 0 + sections + Section 8
        let message_length = 16 + body.len() + 4;
        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2); // Edition 2
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        message.extend(body);
        message.extend_from_slice(b"7777");
        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&self.center.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        body.push(2); // Master table version
        body.push(1); // Local table version
        body.push(1); // Significance of reference time
        body.extend_from_slice(&self.year.to_be_bytes());
        body.push(self.month);
        body.push(self.day);
        body.push(self.hour);
        body.push(0); // Minute
        body.push(0); // Second
        body.push(0); // Production status (operational)
        body.push(1); // Type of data (forecast)
        section(1, &body)
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(0); // Source of grid definition
        body.extend_from_slice(&(self.grid.num_points() as u32).to_be_bytes());
        body.push(0); // Octets for optional list
        body.push(0); // Interpretation of optional list
        body.extend_from_slice(&self.grid.template_number().to_be_bytes());

        // Shape of the earth: spherical, radius 6371229 m
        body.push(6);
        body.extend_from_slice(&[0; 15]);

        match &self.grid {
            GridSpec::LatLon {
                ni,
                nj,
                la1,
                lo1,
                la2,
                lo2,
                di,
                dj,
            } => {
                body.extend_from_slice(&ni.to_be_bytes());
                body.extend_from_slice(&nj.to_be_bytes());
                body.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
                body.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions
                body.extend(sign_magnitude(i64::from(*la1), 4));
                body.extend_from_slice(&lo1.to_be_bytes());
                body.push(48); // Resolution and component flags
                body.extend(sign_magnitude(i64::from(*la2), 4));
                body.extend_from_slice(&lo2.to_be_bytes());
                body.extend_from_slice(&di.to_be_bytes());
                body.extend_from_slice(&dj.to_be_bytes());
                body.push(self.scanning_mode);
            }
            GridSpec::Lambert { nx, ny } => {
                body.extend_from_slice(&nx.to_be_bytes());
                body.extend_from_slice(&ny.to_be_bytes());
                body.extend(sign_magnitude(21_138_123, 4)); // La1
                body.extend_from_slice(&237_280_472u32.to_be_bytes()); // Lo1
                body.push(8); // Resolution and component flags
                body.extend(sign_magnitude(38_500_000, 4)); // LaD
                body.extend(sign_magnitude(262_500_000, 4)); // LoV
                body.extend_from_slice(&3_000_000u32.to_be_bytes()); // Dx (mm)
                body.extend_from_slice(&3_000_000u32.to_be_bytes()); // Dy (mm)
                body.push(0); // Projection centre flag
                body.push(self.scanning_mode);
                body.extend(sign_magnitude(38_500_000, 4)); // Latin1
                body.extend(sign_magnitude(38_500_000, 4)); // Latin2
                body.extend(sign_magnitude(-90_000_000, 4)); // Southern pole lat
                body.extend_from_slice(&0u32.to_be_bytes()); // Southern pole lon
            }
        }
        section(3, &body)
    }

    fn build_section4(&self, field: &FieldSpec) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        body.extend_from_slice(&field.product_template.to_be_bytes());

        // Template 4.0 block, shared by 4.1 and 4.8
        body.push(field.category);
        body.push(field.number);
        body.push(2); // Type of generating process (forecast)
        body.push(0); // Background generating process
        body.push(0); // Analysis or forecast process
        body.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        body.push(0); // Minutes of cutoff
        body.push(1); // Time range unit (hours)
        body.extend_from_slice(&field.forecast_hour.to_be_bytes());
        body.push(field.level_type);
        body.push(0); // Scale factor
        body.extend(sign_magnitude(i64::from(field.level_value), 4));
        body.push(255); // Second fixed surface (none)
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes());

        match field.product_template {
            1 => {
                body.push(3); // Positively perturbed forecast
                body.push(1); // Perturbation number
                body.push(21); // Forecasts in ensemble
            }
            8 => {
                body.extend_from_slice(&self.year.to_be_bytes()); // End of overall time interval
                body.push(self.month);
                body.push(self.day);
                body.push(self.hour);
                body.push(0);
                body.push(0);
                body.push(field.time_ranges);
                body.extend_from_slice(&0u32.to_be_bytes()); // Missing values
                for _ in 0..field.time_ranges.max(1) {
                    body.push(1); // Statistical process (accumulation)
                    body.push(2); // Type of time increment
                    body.push(1); // Time range unit (hours)
                    body.extend_from_slice(&6u32.to_be_bytes());
                    body.push(255);
                    body.extend_from_slice(&0u32.to_be_bytes());
                }
            }
            _ => {}
        }
        section(4, &body)
    }
}

fn build_section6(bitmap: &BitmapSpec, grid_points: usize) -> Vec<u8> {
    match bitmap {
        BitmapSpec::None => section(6, &[255]),
        BitmapSpec::Previous => section(6, &[254]),
        BitmapSpec::Present(mask) => {
            let mut body = vec![0u8; 1 + grid_points.div_ceil(8)];
            for (i, &present) in mask.iter().take(grid_points).enumerate() {
                if present {
                    body[1 + i / 8] |= 0x80 >> (i % 8);
                }
            }
            section(6, &body)
        }
    }
}

/// Simple-pack `values`, returning Sections 5 and 7.
fn pack_simple(values: &[f32], decimal_scale: i16) -> (Vec<u8>, Vec<u8>) {
    let scale = 10.0_f64.powi(i32::from(decimal_scale));
    let scaled: Vec<f64> = values.iter().map(|&v| f64::from(v) * scale).collect();
    let (min_val, max_val) = scaled
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        });
    let (min_val, range) = if scaled.is_empty() {
        (0.0, 0.0)
    } else {
        (min_val, max_val - min_val)
    };

    let reference_value = min_val as f32;
    let (bits_per_value, binary_scale_factor) = if range == 0.0 {
        (0u8, 0i64)
    } else {
        // value = R + X * 2^E with X < 2^16
        (16u8, (range / 65535.0).log2().ceil() as i64)
    };

    let mut section5 = Vec::with_capacity(16);
    section5.extend_from_slice(&(values.len() as u32).to_be_bytes());
    section5.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0
    section5.extend_from_slice(&reference_value.to_be_bytes());
    section5.extend(sign_magnitude(binary_scale_factor, 2));
    section5.extend(sign_magnitude(i64::from(decimal_scale), 2));
    section5.push(bits_per_value);
    section5.push(0); // Original field type (floating point)

    let mut packed = Vec::new();
    if bits_per_value > 0 {
        let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
        for &v in &scaled {
            let x = ((v - f64::from(reference_value)) / binary_scale)
                .round()
                .clamp(0.0, 65535.0) as u16;
            packed.extend_from_slice(&x.to_be_bytes());
        }
    }

    (section(5, &section5), section(7, &packed))
}

/// GRIB2 sign-magnitude integer of `width` octets.
fn sign_magnitude(value: i64, width: usize) -> Vec<u8> {
    let magnitude = value.unsigned_abs();
    let mut bytes: Vec<u8> = (0..width).rev().map(|i| (magnitude >> (8 * i)) as u8).collect();
    if value < 0 {
        bytes[0] |= 0x80;
    }
    bytes
}

/// Prefix `body` with a section header.
fn section(number: u8, body: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(body.len() + 5);
    s.extend_from_slice(&((body.len() + 5) as u32).to_be_bytes());
    s.push(number);
    s.extend_from_slice(body);
    s
}

/// Concatenate messages with optional junk between them, as found in
/// multi-message files.
pub fn concat_messages(messages: &[Vec<u8>], gap: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for message in messages {
        out.extend(std::iter::repeat(0xA5).take(gap));
        out.extend_from_slice(message);
    }
    out
}
