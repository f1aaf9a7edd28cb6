use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CompanyData {
    pub profile: CompanyProfile,
    pub jobs: Vec<JobListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub vision: &'static str,
    pub mission: &'static str,
    pub established: &'static str,
    pub employees: &'static str,
    pub location: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub title: &'static str,
    pub department: &'static str,
    #[serde(rename = "type")]
    pub employment_type: &'static str,
    pub location: &'static str,
    pub requirements: Vec<&'static str>,
    pub salary_range: &'static str,
}

pub fn company_data() -> CompanyData {
    CompanyData {
        profile: CompanyProfile {
            name: "PT. Teknologi Maju Indonesia",
            description: "Perusahaan teknologi terdepan yang mengembangkan solusi inovatif untuk transformasi digital Indonesia.",
            vision: "Menjadi perusahaan teknologi terkemuka di Asia Tenggara yang memberikan solusi terbaik untuk masa depan digital.",
            mission: "Mengembangkan teknologi yang memudahkan kehidupan masyarakat dan mendorong pertumbuhan ekonomi digital Indonesia.",
            established: "2015",
            employees: "500+",
            location: "Jakarta, Indonesia",
        },
        jobs: vec![
            JobListing {
                title: "Senior Frontend Developer",
                department: "Engineering",
                employment_type: "Full-time",
                location: "Jakarta/Remote",
                requirements: vec!["React.js/Vue.js", "JavaScript ES6+", "3+ tahun pengalaman"],
                salary_range: "15-25 juta",
            },
            JobListing {
                title: "Data Scientist",
                department: "Data & Analytics",
                employment_type: "Full-time",
                location: "Jakarta",
                requirements: vec![
                    "Python/R",
                    "Machine Learning",
                    "SQL",
                    "2+ tahun pengalaman",
                ],
                salary_range: "18-30 juta",
            },
            JobListing {
                title: "Product Manager",
                department: "Product",
                employment_type: "Full-time",
                location: "Jakarta",
                requirements: vec![
                    "Product Management",
                    "Agile/Scrum",
                    "5+ tahun pengalaman",
                ],
                salary_range: "20-35 juta",
            },
            JobListing {
                title: "DevOps Engineer",
                department: "Engineering",
                employment_type: "Full-time",
                location: "Jakarta/Remote",
                requirements: vec![
                    "Docker/Kubernetes",
                    "AWS/GCP",
                    "CI/CD",
                    "3+ tahun pengalaman",
                ],
                salary_range: "16-28 juta",
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::company_data;

    #[test]
    fn job_type_serializes_under_type_key() {
        let value = serde_json::to_value(company_data()).expect("company data should serialize");
        assert_eq!(value["profile"]["established"], "2015");
        assert_eq!(value["jobs"].as_array().map(Vec::len), Some(4));
        assert_eq!(value["jobs"][0]["type"], "Full-time");
        assert!(value["jobs"][0].get("employment_type").is_none());
    }
}
